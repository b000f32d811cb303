pub mod pipeline;

pub type CmdResult<T> = pipefitter::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (pipefitter::Result<serde_json::Value>, i32) {
    crate::tty::status("pipefitter is working...");

    match command {
        crate::Commands::Pipeline(args) => dispatch!(args, global, pipeline),
    }
}
