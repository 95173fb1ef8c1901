//! `STREAM` (spec §4.5): words paced 100 ms apart, with a non-blocking
//! poll for `STOP`/`PAUSE`/`RESUME` control lines between each word.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};

use crate::error::{Error, Result};
use crate::node::client_proto::write_line;

const WORD_PAUSE: Duration = Duration::from_millis(100);

pub async fn run<R, W>(reader: &mut R, writer: &mut W, content: &str) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        write_line(writer, "OK_200 EMPTY_FILE_STREAM").await?;
        return Ok(());
    }

    for word in words {
        write_line(writer, word).await?;

        let mut control = String::new();
        match tokio::time::timeout(WORD_PAUSE, reader.read_line(&mut control)).await {
            Ok(Ok(0)) => return Ok(()),
            Ok(Ok(_)) => match control.trim() {
                "STOP" => {
                    write_line(writer, "STREAM_STOPPED").await?;
                    return Ok(());
                }
                "PAUSE" => {
                    write_line(writer, "STREAM_PAUSED").await?;
                    let mut resume = String::new();
                    reader.read_line(&mut resume).await?;
                    if resume.trim() != "RESUME" {
                        return Err(Error::bad_request("expected RESUME to continue a paused stream"));
                    }
                }
                _ => {}
            },
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {}
        }
    }

    write_line(writer, "STREAM_COMPLETE").await?;
    Ok(())
}
