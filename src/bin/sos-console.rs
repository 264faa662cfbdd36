use sos_console::console::{run_command, ConsoleError, EXIT_USAGE};
use sos_console::ui::{MessageBlock, NoticeLevel, OutputMode, PlainRenderer, Renderer};
use sos_console::{parse_command, print_usage, Command};

fn main() {
    // Log level comes from SOS_CONSOLE_LOG, e.g. SOS_CONSOLE_LOG=debug sos-console list
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("SOS_CONSOLE_LOG", "warn"))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let output_mode = OutputMode::from_env();
    let invocation = match parse_command(args) {
        Ok(invocation) => invocation,
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(
                &MessageBlock::new("Invalid command arguments", err.to_string())
                    .with_hint("Run `sos-console --help` to see supported commands"),
            );
            print_usage();
            std::process::exit(EXIT_USAGE);
        }
    };

    if invocation.command == Command::Help {
        print_usage();
        return;
    }

    match run_command(invocation) {
        Ok(output) => {
            if !output.trim().is_empty() {
                println!("{}", output.trim_end());
            }
        }
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let block = err.message_block();
            let _ = if matches!(err, ConsoleError::Cancelled) {
                renderer.notice(NoticeLevel::Warning, &block.body)
            } else {
                renderer.error_block(&block)
            };
            std::process::exit(err.exit_code());
        }
    }
}
