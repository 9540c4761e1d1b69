//! Recording of readings to a plain-text log.
//!
//! One line per period, `SpO2;HeartRate`, lines separated by `\n` with no
//! trailing newline. A single writer task owns the destination for the
//! whole session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ble::SubscriptionManager;
use crate::data::ReadingCell;
use crate::error::RecordingError;
use crate::feedback::{Severity, UserFeedback};

/// Suggested file name for new recordings.
pub const SUGGESTED_FILE_NAME: &str = "NN3150.txt";

/// Chooses where a recording is saved.
#[async_trait]
pub trait DestinationPicker: Send + Sync {
    /// Ask for a destination; `None` when the user cancels.
    async fn pick_save_destination(&self) -> Option<PathBuf>;
}

/// Picker that always answers with the same path.
#[derive(Debug, Clone)]
pub struct FixedDestination(pub PathBuf);

#[async_trait]
impl DestinationPicker for FixedDestination {
    async fn pick_save_destination(&self) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

/// Summary of a running recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingInfo {
    /// When the first line was written.
    pub started_at: DateTime<Utc>,
    /// Destination file, if recording to a file.
    pub destination: Option<PathBuf>,
    /// Interval between lines.
    pub period: Duration,
}

struct RecordingSession {
    info: RecordingInfo,
    cancel: CancellationToken,
    writer: JoinHandle<Result<u64, RecordingError>>,
}

/// Rate-limited writer of the latest reading.
pub struct RecordingSink {
    latest: ReadingCell,
    subscriptions: SubscriptionManager,
    feedback: Arc<dyn UserFeedback>,
    period: Duration,
    /// One slot; held by the writer task for the session's lifetime.
    permit: Arc<Semaphore>,
    session: tokio::sync::Mutex<Option<RecordingSession>>,
}

impl RecordingSink {
    /// Create a sink recording `subscriptions`' latest reading every `period`.
    pub fn new(
        subscriptions: SubscriptionManager,
        feedback: Arc<dyn UserFeedback>,
        period: Duration,
    ) -> Self {
        Self {
            latest: subscriptions.latest().clone(),
            subscriptions,
            feedback,
            period,
            permit: Arc::new(Semaphore::new(1)),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Check if a recording is running.
    pub fn is_recording(&self) -> bool {
        self.permit.available_permits() == 0
    }

    /// Describe the running recording.
    pub async fn info(&self) -> Option<RecordingInfo> {
        if !self.is_recording() {
            return None;
        }
        self.session.lock().await.as_ref().map(|s| s.info.clone())
    }

    /// Start recording to a destination chosen by `picker`.
    ///
    /// The permit is taken before the picker runs, so a second `start` fails
    /// at once; `stop` does not wait for the picker.
    pub async fn start(&self, picker: &dyn DestinationPicker) -> Result<(), RecordingError> {
        let permit = self.acquire()?;

        let Some(path) = picker.pick_save_destination().await else {
            debug!("No save destination selected");
            return Err(self.report(RecordingError::Cancelled));
        };

        let file = match create_file(&path).await {
            Ok(file) => file,
            Err(e) => return Err(self.report(e)),
        };

        let started = self.begin(permit, file, Some(path)).await?;
        *self.session.lock().await = Some(started);
        Ok(())
    }

    /// Start recording to an arbitrary writer.
    pub async fn start_with_writer<W>(&self, writer: W) -> Result<(), RecordingError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let permit = self.acquire()?;

        let started = self.begin(permit, writer, None).await?;
        *self.session.lock().await = Some(started);
        Ok(())
    }

    /// Stop recording.
    ///
    /// Returns once the writer has finished; no line is written afterwards.
    /// A no-op when not recording. If the session had already ended on a
    /// write failure, that failure is returned.
    pub async fn stop(&self) -> Result<(), RecordingError> {
        let session = self.session.lock().await.take();
        let Some(session) = session else {
            return Ok(());
        };

        session.cancel.cancel();

        match session.writer.await {
            Ok(Ok(lines)) => {
                info!("Recording stopped after {} lines", lines);
                self.feedback
                    .notify_user("Recording stopped", Severity::Status);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(self.report(RecordingError::WriteFailed {
                reason: e.to_string(),
            })),
        }
    }

    fn acquire(&self) -> Result<OwnedSemaphorePermit, RecordingError> {
        self.permit
            .clone()
            .try_acquire_owned()
            .map_err(|_| self.report(RecordingError::AlreadyRecording))
    }

    fn report(&self, err: RecordingError) -> RecordingError {
        self.feedback.notify_user(&err.to_string(), Severity::Error);
        err
    }

    async fn begin<W>(
        &self,
        permit: OwnedSemaphorePermit,
        mut writer: W,
        destination: Option<PathBuf>,
    ) -> Result<RecordingSession, RecordingError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let first = self.latest.record_line();
        if let Err(e) = write_line(&mut writer, &first).await {
            return Err(self.report(RecordingError::WriteFailed {
                reason: e.to_string(),
            }));
        }

        let cancel = CancellationToken::new();
        let task = WriterTask {
            writer,
            permit,
            latest: self.latest.clone(),
            subscriptions: self.subscriptions.clone(),
            feedback: self.feedback.clone(),
            period: self.period,
            cancel: cancel.clone(),
        };

        let info = RecordingInfo {
            started_at: Utc::now(),
            destination,
            period: self.period,
        };

        info!(
            "Recording started ({})",
            info.destination
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stream".to_string())
        );
        self.feedback
            .notify_user("Recording started", Severity::Status);

        Ok(RecordingSession {
            info,
            cancel,
            writer: tokio::spawn(task.run()),
        })
    }
}

/// Owns the destination for one session.
struct WriterTask<W> {
    writer: W,
    permit: OwnedSemaphorePermit,
    latest: ReadingCell,
    subscriptions: SubscriptionManager,
    feedback: Arc<dyn UserFeedback>,
    period: Duration,
    cancel: CancellationToken,
}

impl<W> WriterTask<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) -> Result<u64, RecordingError> {
        // The first line was written by `start`.
        let mut lines = 1;
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let line = format!("\n{}", self.latest.record_line());
            if let Err(e) = write_line(&mut self.writer, &line).await {
                return Err(self.fail(e).await);
            }
            lines += 1;
        }

        if let Err(e) = self.writer.shutdown().await {
            warn!("Failed to close recording: {}", e);
        }

        Ok(lines)
    }

    async fn fail(self, e: std::io::Error) -> RecordingError {
        let err = RecordingError::WriteFailed {
            reason: e.to_string(),
        };
        error!("Recording write failed: {}", e);

        drop(self.permit);
        self.feedback.notify_user(&err.to_string(), Severity::Error);

        // The recorded stream may be stale now.
        if let Err(e) = self.subscriptions.unsubscribe().await {
            warn!("{}; clearing subscription locally", e);
            self.subscriptions.force_clear().await;
        }

        err
    }
}

async fn create_file(path: &Path) -> Result<tokio::fs::File, RecordingError> {
    tokio::fs::File::create(path)
        .await
        .map_err(|e| RecordingError::WriteFailed {
            reason: format!("{}: {}.", path.display(), e),
        })
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::gatt::GattDevice;
    use crate::data::Reading;
    use crate::testing::{
        oximetry_characteristic, FailingWriter, FakeDevice, RecordingFeedback, SharedBuffer,
    };
    use pretty_assertions::assert_eq;

    struct NoDestination;

    #[async_trait]
    impl DestinationPicker for NoDestination {
        async fn pick_save_destination(&self) -> Option<PathBuf> {
            None
        }
    }

    /// Picker that answers only once released.
    #[derive(Default)]
    struct GatedDestination {
        asked: tokio::sync::Notify,
        release: tokio::sync::Notify,
        path: PathBuf,
    }

    #[async_trait]
    impl DestinationPicker for GatedDestination {
        async fn pick_save_destination(&self) -> Option<PathBuf> {
            self.asked.notify_one();
            self.release.notified().await;
            Some(self.path.clone())
        }
    }

    fn sink() -> (RecordingSink, SubscriptionManager, Arc<RecordingFeedback>) {
        let feedback = Arc::new(RecordingFeedback::default());
        let subscriptions = SubscriptionManager::new(ReadingCell::new(), feedback.clone());
        let sink = RecordingSink::new(
            subscriptions.clone(),
            feedback.clone(),
            Duration::from_secs(1),
        );
        (sink, subscriptions, feedback)
    }

    fn sleep_ms(ms: u64) -> tokio::time::Sleep {
        tokio::time::sleep(Duration::from_millis(ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_line_per_tick() {
        let (sink, subscriptions, _) = sink();
        let latest = subscriptions.latest().clone();
        let buffer = SharedBuffer::default();

        latest.set(Reading::new(70, 98));
        sink.start_with_writer(buffer.clone()).await.unwrap();

        latest.set(Reading::new(71, 97));
        sleep_ms(1500).await;
        latest.set(Reading::new(72, 96));
        sleep_ms(1000).await;

        sink.stop().await.unwrap();
        sleep_ms(5000).await;

        assert_eq!(buffer.contents(), "98;70\n97;71\n96;72");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let (sink, subscriptions, _) = sink();
        let latest = subscriptions.latest().clone();
        let buffer = SharedBuffer::default();

        latest.set(Reading::new(70, 98));
        sink.start_with_writer(buffer.clone()).await.unwrap();
        latest.set(Reading::new(71, 97));
        sleep_ms(1500).await;

        sink.stop().await.unwrap();
        latest.set(Reading::new(72, 96));
        sleep_ms(5000).await;

        assert_eq!(buffer.contents(), "98;70\n97;71");
        assert!(!sink.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_line_before_any_reading() {
        let (sink, _, _) = sink();
        let buffer = SharedBuffer::default();

        sink.start_with_writer(buffer.clone()).await.unwrap();
        sink.stop().await.unwrap();

        assert_eq!(buffer.contents(), ";");
    }

    #[tokio::test]
    async fn test_already_recording() {
        let (sink, _, feedback) = sink();

        sink.start_with_writer(SharedBuffer::default()).await.unwrap();
        let result = sink.start_with_writer(SharedBuffer::default()).await;

        assert_eq!(result, Err(RecordingError::AlreadyRecording));
        assert!(sink.is_recording());
        assert_eq!(feedback.errors(), vec!["Recording already in progress".to_string()]);

        sink.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_recording() {
        let (sink, _, feedback) = sink();

        tokio_test::assert_ok!(sink.stop().await);
        tokio_test::assert_ok!(sink.stop().await);

        assert!(feedback.messages().is_empty());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (sink, _, _) = sink();

        sink.start_with_writer(SharedBuffer::default()).await.unwrap();
        sink.stop().await.unwrap();
        sink.start_with_writer(SharedBuffer::default()).await.unwrap();

        assert!(sink.is_recording());
        assert_eq!(sink.info().await.map(|i| i.period), Some(Duration::from_secs(1)));
        sink.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_picker_releases_permit() {
        let (sink, _, _) = sink();

        let result = sink.start(&NoDestination).await;

        assert_eq!(result, Err(RecordingError::Cancelled));
        assert!(!sink.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_stops_and_unsubscribes() {
        let (sink, subscriptions, feedback) = sink();
        let fake = Arc::new(FakeDevice::oximeter("dev-1"));
        let device: Arc<dyn GattDevice> = fake.clone();
        subscriptions
            .subscribe(&device, &oximetry_characteristic())
            .await
            .unwrap();

        sink.start_with_writer(FailingWriter::after(1)).await.unwrap();
        sleep_ms(1500).await;

        assert!(!sink.is_recording());
        assert!(!subscriptions.is_subscribed());
        assert_eq!(feedback.errors().len(), 1);

        assert!(matches!(
            sink.stop().await,
            Err(RecordingError::WriteFailed { .. })
        ));
        sink.stop().await.unwrap();

        sink.start_with_writer(SharedBuffer::default()).await.unwrap();
        sink.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_initial_write_failure() {
        let (sink, _, _) = sink();

        let result = sink.start_with_writer(FailingWriter::after(0)).await;

        assert!(matches!(result, Err(RecordingError::WriteFailed { .. })));
        assert!(!sink.is_recording());
    }

    #[tokio::test]
    async fn test_records_to_file() {
        let (sink, subscriptions, _) = sink();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SUGGESTED_FILE_NAME);

        subscriptions.latest().set(Reading::new(64, 99));
        sink.start(&FixedDestination(path.clone())).await.unwrap();
        assert_eq!(
            sink.info().await.and_then(|i| i.destination),
            Some(path.clone())
        );
        sink.stop().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "99;64");
    }

    #[tokio::test]
    async fn test_unwritable_destination() {
        let (sink, _, feedback) = sink();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("log.txt");

        let result = sink.start(&FixedDestination(path)).await;

        assert!(matches!(result, Err(RecordingError::WriteFailed { .. })));
        assert!(!sink.is_recording());
        assert_eq!(feedback.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_does_not_wait_for_picker() {
        let (sink, _, _) = sink();
        let sink = Arc::new(sink);
        let dir = tempfile::tempdir().unwrap();
        let picker = Arc::new(GatedDestination {
            path: dir.path().join(SUGGESTED_FILE_NAME),
            ..Default::default()
        });

        let starting = {
            let sink = sink.clone();
            let picker = picker.clone();
            tokio::spawn(async move { sink.start(picker.as_ref()).await })
        };
        picker.asked.notified().await;

        tokio::time::timeout(Duration::from_secs(1), sink.stop())
            .await
            .expect("stop waited for the picker")
            .unwrap();
        assert_eq!(
            sink.start_with_writer(SharedBuffer::default()).await,
            Err(RecordingError::AlreadyRecording)
        );

        picker.release.notify_one();
        starting.await.unwrap().unwrap();
        assert!(sink.is_recording());

        sink.stop().await.unwrap();
        assert!(!sink.is_recording());
    }
}
