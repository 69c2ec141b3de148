//! A tiny `more`-style pager used by the `help` built-in.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    NextLine,
    Quit,
    Ignore,
}

/// Print one screenful of `reader`, then one more line per space bar press.
///
/// `q`, Esc or Ctrl-C stop early. The terminal is switched to raw mode only while
/// waiting for keys and is always switched back before returning.
pub fn page(reader: impl BufRead, out: &mut dyn Write) -> io::Result<()> {
    let (_, rows) = terminal::size().unwrap_or((80, 24));
    let screen = usize::from(rows.saturating_sub(1)).max(1);

    terminal::enable_raw_mode()?;
    let result = page_with(reader, out, screen, read_step);
    let restored = terminal::disable_raw_mode();
    result.and(restored)
}

fn read_step() -> io::Result<Step> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let step = match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Step::Quit,
                KeyCode::Char(' ') => Step::NextLine,
                KeyCode::Char('q') | KeyCode::Esc => Step::Quit,
                _ => Step::Ignore,
            };
            return Ok(step);
        }
    }
}

fn page_with(
    reader: impl BufRead,
    out: &mut dyn Write,
    screen: usize,
    mut next_step: impl FnMut() -> io::Result<Step>,
) -> io::Result<()> {
    let mut lines = reader.lines();

    for _ in 0..screen {
        match lines.next() {
            // raw mode: no implicit carriage return
            Some(line) => write!(out, "{}\r\n", line?)?,
            None => return out.flush(),
        }
    }
    out.flush()?;

    for line in lines {
        let line = line?;
        loop {
            match next_step()? {
                Step::NextLine => break,
                Step::Quit => return out.flush(),
                Step::Ignore => continue,
            }
        }
        write!(out, "{}\r\n", line)?;
        out.flush()?;
    }
    Ok(())
}
