//! Terminal setup and the picker event loop.

use std::io::{self, stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use super::{draw, handle_key, PickerAction, RoutinePicker};
use crate::meta::RoutineMap;

/// Let the user pick a routine interactively. Returns `None` on cancel.
pub fn pick_routine(routines: &RoutineMap) -> Result<Option<String>> {
    let mut picker = RoutinePicker::new(routines);

    setup_terminal()?;
    let result = Terminal::new(CrosstermBackend::new(stdout()))
        .map_err(anyhow::Error::from)
        .and_then(|mut terminal| run_loop(&mut terminal, &mut picker));
    restore_terminal()?;

    result
}

fn setup_terminal() -> Result<()> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;

    // Leave the alternate screen before the panic message is printed
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        original_hook(panic_info);
    }));

    Ok(())
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(stdout(), LeaveAlternateScreen)?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    picker: &mut RoutinePicker,
) -> Result<Option<String>> {
    let tick_rate = Duration::from_millis(100);

    loop {
        terminal.draw(|frame| draw(frame, picker))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                match handle_key(key, picker) {
                    PickerAction::Continue => {}
                    PickerAction::Select(name) => return Ok(Some(name)),
                    PickerAction::Cancel => return Ok(None),
                }
            }
        }
    }
}
