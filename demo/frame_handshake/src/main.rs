mod config;
use config::FrameHandshakeConfig;
use crossframe_core::{event_map, BrowsingContext, Handler, Messenger, MessengerConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub round: u32,
}

event_map! {
    /// Contract shared by the host page and the widget frame
    pub WidgetEvents {
        Ready("ready") => ReadyPayload,
        Ping("ping") => Round,
        Pong("pong") => Round,
    }
}

/// Everything the host page's handlers report back to `main`
#[derive(Debug)]
enum HostSignal {
    Ready(ReadyPayload),
    Pong(u32),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,crossframe_core=info,frame_handshake=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let cfg = FrameHandshakeConfig::load();
    cfg.validate()?;
    info!(target = "frame_handshake", ?cfg, "Starting frame handshake demo");
    let round_timeout = Duration::from_millis(cfg.round_timeout_ms);

    // Host page, its widget frame, and a window the host opened that turns hostile
    let host = BrowsingContext::new(&cfg.parent_origin)?;
    let widget = host.embed_frame(&cfg.child_origin)?;
    let rogue = host.open_window(&cfg.rogue_origin)?;
    let loops = vec![
        host.spawn_event_loop(),
        widget.spawn_event_loop(),
        rogue.spawn_event_loop(),
    ];

    let host_messenger: Messenger<WidgetEvents> = Messenger::new(
        host.clone(),
        MessengerConfig::from(host.proxy_to(&widget))
            .with_target_origin(cfg.target_origin_for(&cfg.child_origin)?),
    );
    let widget_messenger: Arc<Messenger<WidgetEvents>> = Arc::new(Messenger::new(
        widget.clone(),
        MessengerConfig::from(widget.parent().ok_or("widget frame has no parent")?)
            .with_target_origin(cfg.target_origin_for(&cfg.parent_origin)?),
    ));

    // Host side: forward ready/pong into the main task
    let (tx, mut rx) = mpsc::unbounded_channel();
    {
        let tx = tx.clone();
        host_messenger.on::<Ready>(&Handler::new(move |ready: ReadyPayload| {
            let _ = tx.send(HostSignal::Ready(ready));
        }))?;
    }
    host_messenger.on::<Pong>(&Handler::new(move |round: Round| {
        let _ = tx.send(HostSignal::Pong(round.round));
    }))?;

    // Widget side: answer every ping with a pong for the same round
    let echo = {
        let messenger = Arc::downgrade(&widget_messenger);
        Handler::new(move |round: Round| {
            if let Some(messenger) = messenger.upgrade() {
                if let Err(e) = messenger.emit::<Pong>(&round) {
                    warn!(target = "frame_handshake", error = %e, "Widget failed to answer ping");
                }
            }
        })
    };
    widget_messenger.on::<Ping>(&echo)?;

    let time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    widget_messenger.emit::<Ready>(&ReadyPayload { time })?;

    match tokio::time::timeout(round_timeout, rx.recv()).await? {
        Some(HostSignal::Ready(ready)) => {
            info!(target = "frame_handshake", time = ready.time, "Widget reported ready")
        }
        other => return Err(format!("expected ready, got {:?}", other).into()),
    }

    for round in 1..=cfg.ping_rounds {
        host_messenger.emit::<Ping>(&Round { round })?;
        match tokio::time::timeout(round_timeout, rx.recv()).await? {
            Some(HostSignal::Pong(n)) if n == round => {
                info!(target = "frame_handshake", round, "Pong received")
            }
            other => return Err(format!("round {}: unexpected {:?}", round, other).into()),
        }
    }

    // The rogue window forges a pong; a host bound to the widget's origin drops it
    let rogue_messenger: Messenger<WidgetEvents> = Messenger::new(
        rogue.clone(),
        rogue.opener().ok_or("rogue window has no opener")?,
    );
    rogue_messenger.emit::<Pong>(&Round { round: u32::MAX })?;
    match tokio::time::timeout(round_timeout, rx.recv()).await {
        Ok(Some(HostSignal::Pong(n))) => {
            warn!(target = "frame_handshake", round = n, "Forged pong was accepted (origins unrestricted)")
        }
        Ok(other) => warn!(target = "frame_handshake", ?other, "Unexpected host signal"),
        Err(_) => info!(target = "frame_handshake", "Forged pong was discarded"),
    }

    info!(target = "frame_handshake", stats = ?host_messenger.stats(), "Host messenger stats");
    info!(target = "frame_handshake", stats = ?widget_messenger.stats(), "Widget messenger stats");

    rogue_messenger.destroy();
    widget_messenger.destroy();
    host_messenger.destroy();
    for ctx in [&rogue, &widget, &host] {
        ctx.close();
    }
    for handle in loops {
        handle.await?;
    }

    info!(target = "frame_handshake", "Frame handshake demo finished");
    Ok(())
}
