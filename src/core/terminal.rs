//! Terminal setup and event loop for lookout.
//!
//! Handles raw mode and the alternate screen, redraws, and routes key presses and resizes
//! to the app.

use crate::app::{AppState, KeypressResult};
use crate::ui::render;

use crossterm::{
    cursor::{Hide, Show},
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use std::{io, time::Duration};

/// Puts the terminal in raw mode on the alternate screen and runs the event loop until quit.
///
/// The terminal is restored even when the loop fails.
pub fn run_terminal(app: &mut AppState) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, Hide)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show)?;
    result
}

fn event_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut AppState) -> io::Result<()>
where
    io::Error: From<<B as Backend>::Error>,
{
    terminal.draw(|f| render::render(f, app))?;

    loop {
        if app.tick() {
            terminal.draw(|f| render::render(f, app))?;
        }

        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if app.handle_keypress(key) == KeypressResult::Quit {
                        break;
                    }
                    terminal.draw(|f| render::render(f, app))?;
                }
                Event::Resize(_, _) => {
                    terminal.draw(|f| render::render(f, app))?;
                }
                _ => {}
            }
        }
    }
    tracing::info!("quit requested");
    Ok(())
}
