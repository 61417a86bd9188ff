//! main.rs
//! Entry point for lookout

use lookout_tui::app::AppState;
use lookout_tui::config::Config;
use lookout_tui::core::address::PathAddress;
use lookout_tui::core::terminal;
use lookout_tui::utils::cli::{CliAction, handle_args};
use lookout_tui::utils::logging;

fn main() -> std::io::Result<()> {
    std::panic::set_hook(Box::new(|info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let mut stdout = std::io::stdout();
        let _ = crossterm::execute!(
            stdout,
            crossterm::terminal::LeaveAlternateScreen,
            crossterm::cursor::Show
        );

        eprintln!("\n[lookout] Error occurred: {}", info);

        #[cfg(debug_assertions)]
        {
            let bt = std::backtrace::Backtrace::force_capture();
            eprintln!("\nStack Backtrace:\n{}", bt);
        }
    }));

    let (address, debug) = match handle_args() {
        CliAction::RunApp { address, debug } => (address, debug),
        CliAction::Exit => return Ok(()),
        CliAction::Fail => std::process::exit(1),
    };

    // runs without a log file when the state directory is unwritable
    let _ = logging::init(debug);

    let config = Config::load();

    let cwd = std::env::current_dir()?;
    let start = match PathAddress::parse(address.as_deref().unwrap_or(""), &cwd) {
        Ok(start) => start,
        Err(e) => {
            eprintln!("\n[lookout] Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(address = %start, "opening");

    let mut app = AppState::new(&config, start);
    terminal::run_terminal(&mut app)
}
