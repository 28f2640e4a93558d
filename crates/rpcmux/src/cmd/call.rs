use rpcmux_socket::{Channel, Context};
use tracing::debug;

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{socket_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT};
use crate::output::{print_event, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let call_args: Vec<serde_json::Value> = serde_json::from_str(&args.args)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid args json: {err}")))?;

    let context = Context::new();
    let socket = context
        .client(&args.path)
        .map_err(|err| socket_error("connect failed", err))?;

    let channel = socket
        .open_channel(None)
        .map_err(|err| socket_error("open channel failed", err))?;
    debug!(channel = channel.id(), "channel open");

    channel
        .send(&args.name, call_args)
        .map_err(|err| socket_error("send failed", err))?;

    let reply = channel.recv_timeout(timeout).ok_or_else(|| {
        CliError::new(TIMEOUT, format!("no reply within {}", args.timeout))
    })?;

    print_event(&reply, format);
    socket.close(None);
    Ok(SUCCESS)
}
