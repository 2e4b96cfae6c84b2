//! The chat session: a duplexed event loop over socket and terminal.
//!
//! A dedicated reader task decodes server messages into a bounded channel;
//! the session loop multiplexes that channel with terminal key events through
//! a biased `select!`, so server output is always handled before user input
//! when both are ready. Each source is then drained without blocking, up to a
//! fairness cap, before control returns to the other.

use crate::client::terminal::{LineEditor, Prompt, RawModeGuard};
use crate::config::Config;
use crate::protocol::{
    framing, Inbound, ProtocolError, DEFAULT_MESSAGE, EXIT_COMMAND, MAX_MESSAGE_LEN,
};
use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::{FutureExt, StreamExt};
use std::io;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Messages or key events handled per loop iteration before the other source
/// gets a turn.
const DRAIN_LIMIT: usize = 32;

/// Bound on decoded messages queued between the reader task and the loop.
const INBOUND_QUEUE: usize = 64;

/// Notice printed when the server goes away.
const DISCONNECT_NOTICE: &str = "Disconnected from server.";

/// What the reader task forwards to the session loop.
#[derive(Debug)]
enum ServerEvent {
    /// A decoded read: a message or an orderly close.
    Inbound(Inbound),
    /// The read side failed; fatal to the session.
    Failed(ProtocolError),
}

/// What a completed input line means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Continue,
    Quit,
}

/// Run one chat session over a connected stream until the user exits or the
/// server goes away.
pub async fn run(stream: TcpStream, config: &Config) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel(INBOUND_QUEUE);
    let reader = tokio::spawn(read_loop(BufReader::new(read_half), tx));
    let mut writer = write_half;

    let raw = RawModeGuard::enable().context("failed to enable terminal raw mode")?;
    let result = event_loop(&mut rx, &mut writer, config).await;
    drop(raw);

    reader.abort();
    if let Err(error) = writer.shutdown().await {
        debug!(?error, "connection did not shut down cleanly");
    }
    println!();

    result
}

/// Decode server messages until close or failure, forwarding each into the
/// session channel. Stops as soon as the session loop drops its receiver.
async fn read_loop<R>(mut reader: R, tx: mpsc::Sender<ServerEvent>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match framing::read_message(&mut reader).await {
            Ok(Inbound::Message(text)) => {
                debug!(len = text.len(), "message received");
                let event = ServerEvent::Inbound(Inbound::Message(text));
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Inbound::Disconnected) => {
                let _ = tx.send(ServerEvent::Inbound(Inbound::Disconnected)).await;
                break;
            }
            Err(error) => {
                let _ = tx.send(ServerEvent::Failed(error)).await;
                break;
            }
        }
    }
    debug!("reader task finished");
}

/// The main loop. Returns when either phase ends the session.
async fn event_loop<W>(
    rx: &mut mpsc::Receiver<ServerEvent>,
    writer: &mut W,
    config: &Config,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut events = EventStream::new();
    let mut editor = LineEditor::new(MAX_MESSAGE_LEN);
    let mut prompt = Prompt::new(config.prompt.clone());
    prompt.redraw("")?;

    loop {
        tokio::select! {
            // Server output wins when both sources are ready.
            biased;

            first = rx.recv() => {
                if output_phase(first, rx, &mut prompt, &editor)? {
                    break;
                }
            }
            first = events.next() => {
                if input_phase(first, &mut events, writer, &mut editor, &mut prompt).await? {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Drain everything the reader task has ready, up to the fairness cap.
/// Returns true when the session is over.
fn output_phase(
    first: Option<ServerEvent>,
    rx: &mut mpsc::Receiver<ServerEvent>,
    prompt: &mut Prompt,
    editor: &LineEditor,
) -> Result<bool> {
    let mut printed = false;
    let mut handled = 0;
    let mut next = first;

    loop {
        let Some(event) = next else {
            // Reader task died without delivering a close notice.
            prompt.clear_for_output()?;
            prompt.print_line(DISCONNECT_NOTICE)?;
            return Ok(true);
        };

        match event {
            ServerEvent::Inbound(Inbound::Message(text)) => {
                if !printed {
                    prompt.clear_for_output()?;
                    printed = true;
                }
                prompt.print_line(&format!("Message : {text}"))?;
            }
            ServerEvent::Inbound(Inbound::Disconnected) => {
                prompt.clear_for_output()?;
                prompt.print_line(DISCONNECT_NOTICE)?;
                return Ok(true);
            }
            ServerEvent::Failed(error) => {
                prompt.clear_for_output()?;
                return Err(error).context("lost connection to server");
            }
        }

        handled += 1;
        if handled == DRAIN_LIMIT {
            break;
        }
        next = rx.try_recv().ok();
    }

    if printed {
        // Restore the user's half-typed line under the new output.
        prompt.redraw(editor.as_str())?;
    }
    Ok(false)
}

/// Handle ready key events without blocking, up to the fairness cap.
/// Returns true when the session is over.
async fn input_phase<W>(
    first: Option<io::Result<Event>>,
    events: &mut EventStream,
    writer: &mut W,
    editor: &mut LineEditor,
    prompt: &mut Prompt,
) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let Some(mut current) = first else {
        // Terminal event stream ended; nothing left to read.
        return Ok(true);
    };
    let mut handled = 0;

    loop {
        let event = current.context("failed to read terminal input")?;
        if let Event::Key(key) = event {
            if handle_key(key, writer, editor, prompt).await? == Outcome::Quit {
                return Ok(true);
            }
        }

        handled += 1;
        if handled == DRAIN_LIMIT {
            break;
        }
        match events.next().now_or_never() {
            Some(Some(event)) => current = event,
            Some(None) => return Ok(true),
            None => break,
        }
    }

    Ok(false)
}

/// Feed one key event to the editor, dispatching on Enter.
async fn handle_key<W>(
    key: KeyEvent,
    writer: &mut W,
    editor: &mut LineEditor,
    prompt: &mut Prompt,
) -> Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    if key.kind != KeyEventKind::Press {
        return Ok(Outcome::Continue);
    }

    match key.code {
        KeyCode::Enter => {
            let line = editor.take_line();
            prompt.end_line()?;
            let outcome = dispatch(writer, prompt, &line).await?;
            if outcome == Outcome::Continue {
                prompt.redraw("")?;
            }
            Ok(outcome)
        }
        KeyCode::Backspace => {
            if editor.backspace() {
                prompt.redraw(editor.as_str())?;
            }
            Ok(Outcome::Continue)
        }
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Ok(Outcome::Quit),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if editor.is_empty() {
                Ok(Outcome::Quit)
            } else {
                Ok(Outcome::Continue)
            }
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            if editor.push_char(c) {
                prompt.redraw(editor.as_str())?;
            }
            Ok(Outcome::Continue)
        }
        _ => Ok(Outcome::Continue),
    }
}

/// Act on a completed input line.
///
/// `/exit` ends the session without sending anything. An empty line stands in
/// for the default greeting, echoed locally before it goes out. Anything else
/// is sent verbatim.
async fn dispatch<W>(writer: &mut W, prompt: &mut Prompt, line: &str) -> Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    if line == EXIT_COMMAND {
        return Ok(Outcome::Quit);
    }

    let payload = if line.is_empty() {
        let echo = format!("{} {}", prompt.text(), DEFAULT_MESSAGE);
        prompt.print_line(&echo)?;
        DEFAULT_MESSAGE
    } else {
        line
    };

    framing::write_message(writer, payload)
        .await
        .context("failed to send message")?;
    debug!(len = payload.len(), "message sent");
    Ok(Outcome::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[tokio::test]
    async fn dispatch_exit_sends_nothing() {
        let (mut writer, reader) = duplex(256);
        let mut prompt = Prompt::new(">");

        let outcome = dispatch(&mut writer, &mut prompt, EXIT_COMMAND).await.unwrap();
        assert_eq!(outcome, Outcome::Quit);

        // With the writer closed, an empty wire means nothing was ever sent.
        drop(writer);
        let mut reader = BufReader::new(reader);
        assert_eq!(
            framing::read_message(&mut reader).await.unwrap(),
            Inbound::Disconnected
        );
    }

    #[tokio::test]
    async fn dispatch_empty_line_sends_default_greeting() {
        let (mut writer, reader) = duplex(256);
        let mut prompt = Prompt::new(">");

        let outcome = dispatch(&mut writer, &mut prompt, "").await.unwrap();
        assert_eq!(outcome, Outcome::Continue);

        let mut reader = BufReader::new(reader);
        assert_eq!(
            framing::read_message(&mut reader).await.unwrap(),
            Inbound::Message(DEFAULT_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn dispatch_sends_line_verbatim() {
        let (mut writer, reader) = duplex(256);
        let mut prompt = Prompt::new(">");

        let outcome = dispatch(&mut writer, &mut prompt, "hello").await.unwrap();
        assert_eq!(outcome, Outcome::Continue);

        let mut reader = BufReader::new(reader);
        assert_eq!(
            framing::read_message(&mut reader).await.unwrap(),
            Inbound::Message("hello".to_string())
        );
    }

    #[tokio::test]
    async fn output_phase_stops_at_disconnect() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(ServerEvent::Inbound(Inbound::Disconnected)).await.unwrap();
        tx.send(ServerEvent::Inbound(Inbound::Message("late".to_string())))
            .await
            .unwrap();

        let mut prompt = Prompt::new(">");
        let editor = LineEditor::new(MAX_MESSAGE_LEN);
        let first = rx.recv().await;

        let done = output_phase(first, &mut rx, &mut prompt, &editor).unwrap();
        assert!(done);
        // Anything queued behind the close notice stays unconsumed.
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn output_phase_drains_ready_messages() {
        let (tx, mut rx) = mpsc::channel(8);
        for i in 0..3 {
            tx.send(ServerEvent::Inbound(Inbound::Message(format!("m{i}"))))
                .await
                .unwrap();
        }

        let mut prompt = Prompt::new(">");
        let editor = LineEditor::new(MAX_MESSAGE_LEN);
        let first = rx.recv().await;

        let done = output_phase(first, &mut rx, &mut prompt, &editor).unwrap();
        assert!(!done);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn output_phase_respects_fairness_cap() {
        let (tx, mut rx) = mpsc::channel(DRAIN_LIMIT * 2);
        for i in 0..DRAIN_LIMIT + 5 {
            tx.send(ServerEvent::Inbound(Inbound::Message(format!("m{i}"))))
                .await
                .unwrap();
        }

        let mut prompt = Prompt::new(">");
        let editor = LineEditor::new(MAX_MESSAGE_LEN);
        let first = rx.recv().await;

        let done = output_phase(first, &mut rx, &mut prompt, &editor).unwrap();
        assert!(!done);

        let mut remaining = 0;
        while rx.try_recv().is_ok() {
            remaining += 1;
        }
        assert_eq!(remaining, 5);
    }

    #[tokio::test]
    async fn output_phase_surfaces_read_failure() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(ServerEvent::Failed(ProtocolError::InvalidUtf8))
            .await
            .unwrap();

        let mut prompt = Prompt::new(">");
        let editor = LineEditor::new(MAX_MESSAGE_LEN);
        let first = rx.recv().await;

        let result = output_phase(first, &mut rx, &mut prompt, &editor);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn read_loop_forwards_messages_then_close() {
        let (mut server, client) = duplex(1024);
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(read_loop(BufReader::new(client), tx));

        framing::write_message(&mut server, "one").await.unwrap();
        framing::write_message(&mut server, "two").await.unwrap();
        drop(server);

        assert!(matches!(
            rx.recv().await,
            Some(ServerEvent::Inbound(Inbound::Message(text))) if text == "one"
        ));
        assert!(matches!(
            rx.recv().await,
            Some(ServerEvent::Inbound(Inbound::Message(text))) if text == "two"
        ));
        assert!(matches!(
            rx.recv().await,
            Some(ServerEvent::Inbound(Inbound::Disconnected))
        ));
        assert!(rx.recv().await.is_none());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn enter_key_dispatches_typed_line() {
        let (mut writer, reader) = duplex(256);
        let mut editor = LineEditor::new(MAX_MESSAGE_LEN);
        let mut prompt = Prompt::new(">");
        for c in "hi".chars() {
            editor.push_char(c);
        }

        let outcome = handle_key(press(KeyCode::Enter), &mut writer, &mut editor, &mut prompt)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Continue);
        assert!(editor.is_empty());

        let mut reader = BufReader::new(reader);
        assert_eq!(
            framing::read_message(&mut reader).await.unwrap(),
            Inbound::Message("hi".to_string())
        );
    }

    #[tokio::test]
    async fn ctrl_c_quits() {
        let (mut writer, _reader) = duplex(256);
        let mut editor = LineEditor::new(MAX_MESSAGE_LEN);
        let mut prompt = Prompt::new(">");

        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let outcome = handle_key(key, &mut writer, &mut editor, &mut prompt)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Quit);
    }

    #[tokio::test]
    async fn typed_exit_command_quits_without_sending() {
        let (mut writer, reader) = duplex(256);
        let mut editor = LineEditor::new(MAX_MESSAGE_LEN);
        let mut prompt = Prompt::new(">");
        for c in EXIT_COMMAND.chars() {
            editor.push_char(c);
        }

        let outcome = handle_key(press(KeyCode::Enter), &mut writer, &mut editor, &mut prompt)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Quit);

        drop(writer);
        let mut reader = BufReader::new(reader);
        assert_eq!(
            framing::read_message(&mut reader).await.unwrap(),
            Inbound::Disconnected
        );
    }
}
