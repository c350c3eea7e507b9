//! Runtime reconfiguration through a named pipe
//!
//! External programs change the delay bounds by writing four integers to
//! the pipe:
//!
//! ```text
//! echo "10 20 0 5" > /tmp/delay_fifo
//! ```
//!
//! The values are `min_key max_key min_move max_move` in milliseconds. A
//! message that is not exactly four non-negative integers is ignored and
//! the current delays stay in place.

use crate::delay::{ConfigurationStore, DelayParameters, Distribution};
use crate::device::EventClass;
use crate::shutdown::ShutdownSignal;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the read buffer; longer messages are split across reads
pub const MESSAGE_BUFFER_LEN: usize = 80;

/// Error for a rejected reconfiguration message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconfigError {
    #[error("expected 4 values, got {0}")]
    WrongCount(usize),
    #[error("invalid delay value '{0}'")]
    InvalidValue(String),
}

/// New bounds for both event classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayUpdate {
    pub min_key: u32,
    pub max_key: u32,
    pub min_move: u32,
    pub max_move: u32,
}

/// Parse `min_key max_key min_move max_move`
pub fn parse_message(message: &str) -> Result<DelayUpdate, ReconfigError> {
    let values = message
        .split_whitespace()
        .map(|token| {
            token
                .parse::<u32>()
                .map_err(|_| ReconfigError::InvalidValue(token.to_string()))
        })
        .collect::<Result<Vec<u32>, _>>()?;

    match values[..] {
        [min_key, max_key, min_move, max_move] => Ok(DelayUpdate {
            min_key,
            max_key,
            min_move,
            max_move,
        }),
        _ => Err(ReconfigError::WrongCount(values.len())),
    }
}

/// Message counters, returned when the listener stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub applied: u64,
    pub rejected: u64,
}

/// Applies reconfiguration messages to the [`ConfigurationStore`].
///
/// Consecutive writes can share one read, and a read can stop in the middle
/// of a message, so bytes after the last newline are held until the rest of
/// the line arrives.
pub struct ReconfigListener {
    store: Arc<ConfigurationStore>,
    stats: ListenerStats,
    /// Start of a message whose newline has not arrived yet
    pending: Vec<u8>,
    /// Skipping the rest of an overlong message
    discarding: bool,
}

impl ReconfigListener {
    pub fn new(store: Arc<ConfigurationStore>) -> Self {
        Self {
            store,
            stats: ListenerStats::default(),
            pending: Vec::with_capacity(MESSAGE_BUFFER_LEN),
            discarding: false,
        }
    }

    pub fn stats(&self) -> ListenerStats {
        self.stats
    }

    /// Parse one message and publish it; the store is untouched on error
    pub fn handle_message(&mut self, message: &str) -> Result<DelayUpdate, ReconfigError> {
        match parse_message(message) {
            Ok(update) => {
                self.apply(update);
                self.stats.applied += 1;
                Ok(update)
            }
            Err(e) => {
                log::warn!("Could not set new delays ({}): {:?}", e, message.trim());
                self.stats.rejected += 1;
                Err(e)
            }
        }
    }

    /// Handle the bytes of one read; returns how many messages were applied.
    ///
    /// Every newline-terminated, non-empty line is a message. Trailing bytes
    /// wait for the next chunk. A message that grows past
    /// [`MESSAGE_BUFFER_LEN`] bytes without a newline is rejected and
    /// skipped up to its newline.
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> usize {
        let mut applied = 0;
        let mut rest = chunk;

        while let Some(end) = rest.iter().position(|&b| b == b'\n') {
            if self.complete_line(&rest[..end]) {
                applied += 1;
            }
            rest = &rest[end + 1..];
        }
        self.hold(rest);

        applied
    }

    /// Handle a last message left without a newline once the writer is gone
    pub fn finish(&mut self) -> bool {
        let line = std::mem::take(&mut self.pending);
        let discarding = std::mem::take(&mut self.discarding);
        !discarding && self.handle_line(&line)
    }

    /// Bytes waiting for the end of their line
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn complete_line(&mut self, tail: &[u8]) -> bool {
        if std::mem::take(&mut self.discarding) {
            return false;
        }
        self.pending.extend_from_slice(tail);
        let line = std::mem::take(&mut self.pending);
        self.handle_line(&line)
    }

    fn hold(&mut self, fragment: &[u8]) {
        if self.discarding {
            return;
        }
        self.pending.extend_from_slice(fragment);
        if self.pending.len() > MESSAGE_BUFFER_LEN {
            log::warn!(
                "Could not set new delays: message longer than {} bytes",
                MESSAGE_BUFFER_LEN
            );
            self.pending.clear();
            self.discarding = true;
            self.stats.rejected += 1;
        }
    }

    fn handle_line(&mut self, line: &[u8]) -> bool {
        let text = String::from_utf8_lossy(line);
        !text.trim().is_empty() && self.handle_message(&text).is_ok()
    }

    fn apply(&self, update: DelayUpdate) {
        let key = self.publish_bounds(EventClass::Key, update.min_key, update.max_key);
        let movement = self.publish_bounds(EventClass::Move, update.min_move, update.max_move);

        log::debug!(
            "Set new values: {} {} {} {}",
            key.min_delay_ms,
            key.max_delay_ms,
            movement.min_delay_ms,
            movement.max_delay_ms
        );
    }

    fn publish_bounds(&self, class: EventClass, min_ms: u32, max_ms: u32) -> DelayParameters {
        // Single writer: nothing can change the slot between these calls
        let previous = self.store.read(class);
        let published = self.store.set_bounds(class, min_ms, max_ms);

        if published.distribution == Distribution::Normal && published.mean != previous.mean {
            log::warn!(
                "Mean {} is outside the new {} delay range [{}, {}], using {}",
                previous.mean,
                class,
                published.min_delay_ms,
                published.max_delay_ms,
                published.mean
            );
        }
        published
    }

    /// Read messages from `reader` until shutdown or end of stream
    pub async fn run<R>(mut self, mut reader: R, mut shutdown: ShutdownSignal) -> ListenerStats
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = [0u8; MESSAGE_BUFFER_LEN];

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    if !self.pending.is_empty() {
                        log::debug!("Dropping unterminated message at shutdown");
                    }
                    break;
                }
                read = reader.read(&mut buffer) => match read {
                    Ok(0) => {
                        log::debug!("Reconfiguration channel closed");
                        self.finish();
                        break;
                    }
                    Ok(n) => {
                        self.handle_chunk(&buffer[..n]);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::error!("Reconfiguration channel failed: {}", e);
                        break;
                    }
                },
            }
        }

        self.stats
    }
}

#[cfg(target_os = "linux")]
pub use channel::{ChannelError, ReconfigChannel};

#[cfg(target_os = "linux")]
mod channel {
    use nix::sys::stat::{umask, Mode};
    use nix::unistd::mkfifo;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use thiserror::Error;
    use tokio::io::{AsyncRead, ReadBuf};
    use tokio::net::unix::pipe;

    /// Error creating the reconfiguration pipe
    #[derive(Debug, Error)]
    pub enum ChannelError {
        #[error("Failed to remove stale FIFO {path}: {source}")]
        Remove { path: PathBuf, source: io::Error },
        #[error("Failed to create FIFO {path}: {source}")]
        Create { path: PathBuf, source: nix::Error },
        #[error("Failed to open FIFO {path}: {source}")]
        Open { path: PathBuf, source: io::Error },
    }

    /// Named pipe that reconfiguration messages are written to.
    ///
    /// The pipe is removed when the channel is dropped.
    pub struct ReconfigChannel {
        path: PathBuf,
        receiver: pipe::Receiver,
    }

    impl ReconfigChannel {
        /// Create the FIFO at `path`, replacing any existing file.
        ///
        /// Must be called inside a tokio runtime.
        pub fn create(path: impl AsRef<Path>) -> Result<Self, ChannelError> {
            let path = path.as_ref().to_path_buf();

            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(ChannelError::Remove { path, source }),
            }

            // Writable by any user regardless of our umask
            let previous = umask(Mode::empty());
            let created = mkfifo(&path, Mode::from_bits_truncate(0o666));
            umask(previous);
            if let Err(source) = created {
                return Err(ChannelError::Create { path, source });
            }

            // Read-write keeps the pipe from reporting end-of-file every
            // time a writer closes it.
            let receiver = match pipe::OpenOptions::new()
                .read_write(true)
                .open_receiver(&path)
            {
                Ok(receiver) => receiver,
                Err(source) => {
                    let _ = std::fs::remove_file(&path);
                    return Err(ChannelError::Open { path, source });
                }
            };

            log::info!("Listening for delay changes on {}", path.display());
            Ok(Self { path, receiver })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl AsyncRead for ReconfigChannel {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().receiver).poll_read(cx, buf)
        }
    }

    impl Drop for ReconfigChannel {
        fn drop(&mut self) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("Failed to remove FIFO {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::DelaySampler;
    use crate::shutdown::Shutdown;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn store() -> Arc<ConfigurationStore> {
        Arc::new(ConfigurationStore::new(
            DelayParameters::linear(5, 15),
            DelayParameters::constant(2),
        ))
    }

    #[test]
    fn parses_four_integers() {
        assert_eq!(
            parse_message("10 20 0 5\n"),
            Ok(DelayUpdate {
                min_key: 10,
                max_key: 20,
                min_move: 0,
                max_move: 5,
            })
        );
        assert!(parse_message("  1\t2  3 4  ").is_ok());
    }

    #[test]
    fn rejects_wrong_counts_and_bad_tokens() {
        assert_eq!(parse_message(""), Err(ReconfigError::WrongCount(0)));
        assert_eq!(parse_message("1 2 3"), Err(ReconfigError::WrongCount(3)));
        assert_eq!(parse_message("1 2 3 4 5"), Err(ReconfigError::WrongCount(5)));
        assert_eq!(
            parse_message("abc"),
            Err(ReconfigError::InvalidValue("abc".to_string()))
        );
        assert!(parse_message("1 2 -3 4").is_err());
        assert!(parse_message("1 2 3.5 4").is_err());
    }

    #[test]
    fn message_updates_both_classes() {
        let store = store();
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        listener.handle_message("10 20 0 0").unwrap();

        let key = store.read(EventClass::Key);
        assert_eq!((key.min_delay_ms, key.max_delay_ms), (10, 20));
        let movement = store.read(EventClass::Move);
        assert_eq!((movement.min_delay_ms, movement.max_delay_ms), (0, 0));
        assert_eq!(listener.stats(), ListenerStats { applied: 1, rejected: 0 });
    }

    #[test]
    fn inverted_bounds_are_clamped() {
        let store = store();
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        listener.handle_message("30 10 8 1").unwrap();

        let key = store.read(EventClass::Key);
        assert_eq!((key.min_delay_ms, key.max_delay_ms), (30, 30));
        let movement = store.read(EventClass::Move);
        assert_eq!((movement.min_delay_ms, movement.max_delay_ms), (8, 8));
    }

    #[test]
    fn malformed_message_leaves_store_unchanged() {
        let store = store();
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        assert!(listener.handle_message("abc").is_err());
        assert!(listener.handle_message("1 2").is_err());

        assert_eq!(store.read(EventClass::Key), DelayParameters::linear(5, 15));
        assert_eq!(store.read(EventClass::Move), DelayParameters::constant(2));
        assert_eq!(listener.stats().rejected, 2);
    }

    #[test]
    fn chunk_with_several_lines_applies_each() {
        let store = store();
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        let applied = listener.handle_chunk(b"1 2 3 4\nnope\n\n7 8 9 10\n");

        assert_eq!(applied, 2);
        assert_eq!(store.read(EventClass::Key).min_delay_ms, 7);
        assert_eq!(store.read(EventClass::Move).max_delay_ms, 10);
        assert_eq!(listener.stats(), ListenerStats { applied: 2, rejected: 1 });
    }

    #[test]
    fn partial_line_waits_for_its_newline() {
        let store = store();
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        assert_eq!(listener.handle_chunk(b"1 2 3 4\n12 34 56 7"), 1);
        assert_eq!(listener.pending(), b"12 34 56 7");
        assert_eq!(store.read(EventClass::Move).max_delay_ms, 4);

        assert_eq!(listener.handle_chunk(b"8\n"), 1);
        assert!(listener.pending().is_empty());
        let movement = store.read(EventClass::Move);
        assert_eq!((movement.min_delay_ms, movement.max_delay_ms), (56, 78));
        assert_eq!(listener.stats(), ListenerStats { applied: 2, rejected: 0 });
    }

    #[test]
    fn unterminated_message_is_applied_at_end_of_stream() {
        let store = store();
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        assert_eq!(listener.handle_chunk(b"9 19 1 2"), 0);
        assert!(listener.finish());
        assert_eq!(store.read(EventClass::Key).max_delay_ms, 19);
        assert!(!listener.finish());
    }

    #[test]
    fn overlong_message_is_skipped_up_to_its_newline() {
        let store = store();
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        let long = [b'1'; MESSAGE_BUFFER_LEN];
        assert_eq!(listener.handle_chunk(&long), 0);
        assert_eq!(listener.handle_chunk(b" 2 3 4"), 0);
        assert!(listener.pending().is_empty());
        assert_eq!(listener.stats().rejected, 1);

        // The tail of the long message must not be read as a message
        assert_eq!(listener.handle_chunk(b" 5 6\n30 40 1 2\n"), 1);
        assert_eq!(store.read(EventClass::Key).min_delay_ms, 30);
        assert_eq!(listener.stats(), ListenerStats { applied: 1, rejected: 1 });
    }

    #[test]
    fn narrowed_bounds_pull_normal_mean_inside() {
        let store = Arc::new(ConfigurationStore::new(
            DelayParameters::normal(0, 100, 50.0, 5.0),
            DelayParameters::default(),
        ));
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        listener.handle_message("10 20 0 0").unwrap();

        let key = store.read(EventClass::Key);
        assert_eq!(key.mean, 20.0);
        assert!(key.mean_in_bounds());

        let mut sampler = DelaySampler::new(StdRng::seed_from_u64(7));
        let samples: BTreeSet<u32> = (0..200).map(|_| sampler.sample(&key)).collect();
        assert!(samples.iter().all(|delay| (10..=20).contains(delay)));
        assert!(samples.len() > 1, "range collapsed to {:?}", samples);
    }

    #[test]
    fn bounds_change_keeps_normal_distribution() {
        let store = Arc::new(ConfigurationStore::new(
            DelayParameters::normal(10, 30, 20.0, 2.0),
            DelayParameters::default(),
        ));
        let mut listener = ReconfigListener::new(Arc::clone(&store));

        listener.handle_message("0 100 0 0").unwrap();

        let key = store.read(EventClass::Key);
        assert_eq!(key.distribution, Distribution::Normal);
        assert_eq!(key.mean, 20.0);
        assert_eq!(key.max_delay_ms, 100);
    }

    #[tokio::test]
    async fn run_applies_messages_until_shutdown() {
        let store = store();
        let shutdown = Shutdown::new();
        let (mut writer, reader) = tokio::io::duplex(256);

        let listener = tokio::spawn(
            ReconfigListener::new(Arc::clone(&store)).run(reader, shutdown.subscribe()),
        );

        writer.write_all(b"40 60 1 2\n").await.unwrap();
        for _ in 0..100 {
            if store.read(EventClass::Key).min_delay_ms == 40 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.read(EventClass::Key).max_delay_ms, 60);

        shutdown.trigger();
        let stats = tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener did not stop")
            .unwrap();
        assert_eq!(stats.applied, 1);
        // Writer is still open: the listener stopped because of shutdown
        drop(writer);
    }

    #[tokio::test]
    async fn run_joins_messages_split_across_reads() {
        let store = store();
        let shutdown = Shutdown::new();
        let (mut writer, reader) = tokio::io::duplex(256);

        // 70 + 12 bytes: the first read ends after "12 34 56 7"
        let first = format!("{:<69}\n", "1 2 3 4");
        writer.write_all(first.as_bytes()).await.unwrap();
        writer.write_all(b"12 34 56 78\n").await.unwrap();
        drop(writer);

        let stats = tokio::time::timeout(
            Duration::from_secs(1),
            ReconfigListener::new(Arc::clone(&store)).run(reader, shutdown.subscribe()),
        )
        .await
        .expect("listener did not stop");

        assert_eq!(stats, ListenerStats { applied: 2, rejected: 0 });
        let movement = store.read(EventClass::Move);
        assert_eq!((movement.min_delay_ms, movement.max_delay_ms), (56, 78));
    }

    #[tokio::test]
    async fn run_stops_at_end_of_stream() {
        let store = store();
        let shutdown = Shutdown::new();
        let (mut writer, reader) = tokio::io::duplex(256);

        writer.write_all(b"garbage\n").await.unwrap();
        drop(writer);

        let stats = tokio::time::timeout(
            Duration::from_secs(1),
            ReconfigListener::new(Arc::clone(&store)).run(reader, shutdown.subscribe()),
        )
        .await
        .expect("listener did not stop");

        assert_eq!(stats, ListenerStats { applied: 0, rejected: 1 });
        assert_eq!(store.read(EventClass::Key), DelayParameters::linear(5, 15));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn fifo_channel_receives_messages_and_is_removed() {
        use std::io::Write;

        let path = std::env::temp_dir().join(format!("delay-daemon-fifo-{}", std::process::id()));
        let store = store();
        let shutdown = Shutdown::new();

        let channel = ReconfigChannel::create(&path).unwrap();
        assert!(path.exists());
        let listener = tokio::spawn(
            ReconfigListener::new(Arc::clone(&store)).run(channel, shutdown.subscribe()),
        );

        // The listener holds a read end open, so this does not block
        let mut fifo = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        fifo.write_all(b"11 22 3 4\n").unwrap();
        drop(fifo);

        for _ in 0..200 {
            if store.read(EventClass::Key).min_delay_ms == 11 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.read(EventClass::Key).max_delay_ms, 22);
        assert_eq!(store.read(EventClass::Move).min_delay_ms, 3);

        shutdown.trigger();
        let stats = listener.await.unwrap();
        assert_eq!(stats.applied, 1);
        assert!(!path.exists());
    }
}
