use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use rpcmux_socket::{Channel, Context, Notification, HEARTBEAT_EVENT};
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{socket_error, CliError, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let context = Context::new();
    let socket = context
        .server(&args.path)
        .map_err(|err| socket_error("bind failed", err))?;
    let notifications = socket.notifications();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(path = ?args.path, "serving");
    let mut answered = 0usize;

    while running.load(Ordering::SeqCst) {
        let notification = match notifications.recv_timeout(Duration::from_millis(200)) {
            Ok(notification) => notification,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match notification {
            Notification::NewInboundRequest(event) => {
                // Stray keep-alives for channels we already answered.
                if event.name() == HEARTBEAT_EVENT {
                    continue;
                }

                print_event(&event, format);

                let channel = match socket.open_channel(Some(event.clone())) {
                    Ok(channel) => channel,
                    Err(err) => {
                        warn!(error = %err, "could not open channel for request");
                        continue;
                    }
                };
                if let Err(err) = channel.send(event.name(), event.args().to_vec()) {
                    warn!(error = %err, "reply send failed");
                }
                channel.close();

                answered = answered.saturating_add(1);
                if let Some(count) = args.count {
                    if answered >= count {
                        break;
                    }
                }
            }
            Notification::Error(err) => {
                warn!(error = %err, "socket error");
            }
            Notification::Received(_) => {}
        }
    }

    socket.close(None);
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
