//! Interactive query loop.

use runtime::{Backend, Orchestrator, ToolHost};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

const PROMPT: &str = "\nQuery: ";

/// True if `input` asks to end the session.
pub fn is_quit(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("quit")
}

/// Read queries from `input` until `quit` or EOF, answering each one.
///
/// A failed query is reported and the loop moves on to the next line; only
/// I/O errors on `input` or `output` end it early.
pub async fn run<B, H, R, W>(
    orchestrator: &Orchestrator<B, H>,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    B: Backend,
    H: ToolHost,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(b"\nMCP Client Started!\nType your queries or 'quit' to exit.\n")
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_quit(query) {
            break;
        }

        let reply = match orchestrator.process_query(query).await {
            Ok(answer) => format!("\n{answer}\n"),
            Err(e) => {
                warn!(error = %e, "query failed");
                format!("\nError: {e}\n")
            }
        };
        output.write_all(reply.as_bytes()).await?;
    }

    output.flush().await
}
