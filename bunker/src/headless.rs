//! Stdin command loop.
//!
//! Each input line is one command. Replies are printed with a tag:
//! - `[OK]` for a completed command, followed by its output
//! - `[ERROR]` for parse failures and failed actions
//!
//! Input is read asynchronously on the single runtime thread, so pending
//! autosave timers fire between commands rather than alongside them.

use bunker_core::headless::HELP;
use bunker_core::{Command, HeadlessConfig, HeadlessError, HeadlessSession};
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Run the shell until `quit` or end of input.
pub async fn run(config: HeadlessConfig) -> Result<(), HeadlessError> {
    let session = HeadlessSession::open(config).await?;

    println!("=== Novel Bunker ===");
    println!("{}", session.render_outline());
    println!();
    println!("{HELP}");
    println!();

    let stdin = BufReader::new(tokio::io::stdin());
    serve(&session, stdin, &mut io::stdout()).await;
    Ok(())
}

/// Execute commands read from `input`, writing tagged replies to `out`.
async fn serve<R, W>(session: &HeadlessSession, input: R, out: &mut W)
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(out, "[ERROR] {message}").ok();
                out.flush().ok();
                continue;
            }
        };

        match session.execute(command).await {
            Ok(reply) => {
                writeln!(out, "[OK]").ok();
                if !reply.text.is_empty() {
                    writeln!(out, "{}", reply.text).ok();
                }
                if reply.quit {
                    tracing::info!("Session ended by quit");
                    out.flush().ok();
                    break;
                }
            }
            Err(e) => {
                writeln!(out, "[ERROR] {e}").ok();
            }
        }
        out.flush().ok();
    }
}
