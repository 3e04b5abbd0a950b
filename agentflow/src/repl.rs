//! Line-oriented prompt loop shared by the interactive binaries.

use std::future::{self, Future};
use std::io;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::watch;
use tracing::debug;

/// Inputs that end an interactive session, compared case-insensitively.
pub const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "q"];

/// Returns `true` when `line` asks to leave the session.
#[must_use]
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS
        .iter()
        .any(|command| line.eq_ignore_ascii_case(command))
}

/// Session-wide interrupt counter.
///
/// Every press is counted, whether it arrives at the prompt, during a turn or
/// in between, so none is lost.
#[derive(Clone, Debug)]
pub struct Interrupt {
    presses: watch::Receiver<u64>,
}

/// Raises an [`Interrupt`] by hand.
#[derive(Debug)]
pub struct InterruptTrigger {
    presses: watch::Sender<u64>,
}

impl InterruptTrigger {
    /// Records one interrupt.
    pub fn trigger(&self) {
        self.presses.send_modify(|presses| *presses += 1);
    }
}

impl Interrupt {
    /// Interrupt fed by a single Ctrl-C listener that lives as long as any
    /// receiver.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn ctrl_c() -> Self {
        let (trigger, interrupt) = Self::manual();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                debug!("ctrl-c received");
                trigger.trigger();
                if trigger.presses.is_closed() {
                    break;
                }
            }
        });
        interrupt
    }

    /// Interrupt raised only through the returned trigger.
    #[must_use]
    pub fn manual() -> (InterruptTrigger, Self) {
        let (presses, receiver) = watch::channel(0);
        (InterruptTrigger { presses }, Self { presses: receiver })
    }

    /// Interrupts seen so far.
    #[must_use]
    pub fn presses(&self) -> u64 {
        *self.presses.borrow()
    }

    /// Resolves once more than `seen` interrupts have been recorded.
    ///
    /// Never resolves once the trigger is gone.
    pub fn after(&self, seen: u64) -> impl Future<Output = ()> + Send + 'static {
        let mut presses = self.presses.clone();
        async move {
            let closed = presses.wait_for(|presses| *presses > seen).await.is_err();
            if closed {
                future::pending::<()>().await;
            }
        }
    }
}

/// Prompts for and reads one request at a time.
///
/// The session ends on an exit command, end of input, or an interrupt that
/// nothing has [cleared](Repl::clear_interrupt). Blank lines are skipped.
#[derive(Debug)]
pub struct Repl<R, W> {
    lines: Lines<R>,
    out: W,
    prompt: String,
    interrupt: Interrupt,
    handled: u64,
}

impl Repl<BufReader<Stdin>, Stdout> {
    /// Session on the process's stdin and stdout, interrupted by Ctrl-C.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn stdio(prompt: impl Into<String>) -> Self {
        Self::new(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            prompt,
            Interrupt::ctrl_c(),
        )
    }
}

impl<R, W> Repl<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Session reading from `reader` and prompting on `out`.
    pub fn new(reader: R, out: W, prompt: impl Into<String>, interrupt: Interrupt) -> Self {
        let handled = interrupt.presses();
        Self {
            lines: reader.lines(),
            out,
            prompt: prompt.into(),
            interrupt,
            handled,
        }
    }

    /// Waits for the next non-blank request, or `None` once the session is
    /// over.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the reader or writer.
    pub async fn next_request(&mut self) -> io::Result<Option<String>> {
        loop {
            if self.is_interrupted() {
                debug!("interrupted");
                return Ok(None);
            }
            self.out.write_all(self.prompt.as_bytes()).await?;
            self.out.flush().await?;

            let interrupted = self.interrupted();
            let line = tokio::select! {
                line = self.lines.next_line() => line?,
                () = interrupted => {
                    debug!("interrupted at prompt");
                    None
                }
            };

            let Some(line) = line else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if is_exit_command(line) {
                return Ok(None);
            }
            return Ok(Some(line.to_owned()));
        }
    }

    /// Resolves on the first interrupt not yet cleared.
    ///
    /// Race a turn against it; unless [`Repl::clear_interrupt`] is called the
    /// next [`Repl::next_request`] ends the session.
    pub fn interrupted(&self) -> impl Future<Output = ()> + Send + 'static {
        self.interrupt.after(self.handled)
    }

    /// Returns `true` when an interrupt is pending.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.presses() > self.handled
    }

    /// Marks pending interrupts as handled so the session continues.
    pub fn clear_interrupt(&mut self) {
        self.handled = self.interrupt.presses();
    }

    /// Returns the writer, e.g. to inspect what was prompted.
    pub fn into_writer(self) -> W {
        self.out
    }
}
