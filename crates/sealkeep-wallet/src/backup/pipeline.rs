//! Background export/restore
//!
//! Each transfer runs on one blocking worker and reports through a channel:
//! zero or more `Progress` events, then exactly one terminal event. Cancellation
//! is cooperative and checked between records.
//!
//! The worker never blocks on the channel while it holds the store lock: an
//! observer that reads the wallet would wait on that lock and stop draining.

use std::cell::Cell;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use sealkeep_core::{WalletError, WalletRecord, WalletResult};
use sealkeep_crypto::KeyDerivationData;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::codec::{BackupReader, BackupWriter};
use super::header::Header;
use super::BackupConfig;
use crate::wallet::{crypto_err, Wallet};

const EVENT_BUFFER: usize = 64;

#[derive(Debug)]
pub enum TransferEvent {
    /// Export: records still to write. Restore: records restored so far.
    Progress(u64),
    /// Terminal: total records moved
    Completed(u64),
    /// Terminal: the transfer stopped; nothing was committed
    Failed(WalletError),
}

impl TransferEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferEvent::Progress(_))
    }
}

/// Handle to a running export or restore.
///
/// Dropping the handle cancels the transfer at the next record boundary.
#[derive(Debug)]
pub struct Transfer {
    events: mpsc::Receiver<TransferEvent>,
    cancel: CancellationToken,
}

impl Transfer {
    /// Next event, or `None` once the terminal event has been delivered.
    pub async fn next(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Blocking variant of [`Transfer::next`] for synchronous callers.
    /// Must not be called from inside an async context.
    pub fn blocking_next(&mut self) -> Option<TransferEvent> {
        self.events.blocking_recv()
    }

    /// Ask the worker to stop before the next record.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain progress and return the terminal outcome.
    pub async fn wait(mut self) -> WalletResult<u64> {
        while let Some(event) = self.next().await {
            match event {
                TransferEvent::Progress(_) => {}
                TransferEvent::Completed(total) => return Ok(total),
                TransferEvent::Failed(err) => return Err(err),
            }
        }
        Err(WalletError::Other(anyhow::anyhow!(
            "transfer worker exited without a result"
        )))
    }

    /// Consume the handle as a `Stream` of events.
    pub fn into_stream(self) -> ReceiverStream<TransferEvent> {
        ReceiverStream::new(self.events)
    }
}

/// Worker side of a transfer.
struct Reporter {
    events: mpsc::Sender<TransferEvent>,
    cancel: CancellationToken,
    /// Newest count held back by `progress_nowait` because the channel was full
    pending: Cell<Option<u64>>,
}

impl Reporter {
    fn check(&self) -> WalletResult<()> {
        if self.cancel.is_cancelled() || self.events.is_closed() {
            return Err(WalletError::Cancelled);
        }
        Ok(())
    }

    /// Blocks while the channel is full. Only call without the store lock held.
    fn progress(&self, n: u64) -> WalletResult<()> {
        self.events
            .blocking_send(TransferEvent::Progress(n))
            .map_err(|_| WalletError::Cancelled)
    }

    /// Never blocks. When the channel is full the count is held back; a later
    /// count supersedes it, and `flush` delivers whatever is left.
    fn progress_nowait(&self, n: u64) -> WalletResult<()> {
        match self.events.try_send(TransferEvent::Progress(n)) {
            Ok(()) => {
                self.pending.set(None);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.pending.set(Some(n));
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(WalletError::Cancelled),
        }
    }

    /// Deliver a held-back count. Runs after commit, so a vanished receiver
    /// no longer changes the outcome.
    fn flush(&self) {
        if let Some(n) = self.pending.take() {
            let _ = self.events.blocking_send(TransferEvent::Progress(n));
        }
    }

    fn finish(self, op: &str, result: WalletResult<u64>) {
        let event = match result {
            Ok(total) => {
                info!(op, records = total, "transfer complete");
                TransferEvent::Completed(total)
            }
            Err(err) => {
                warn!(op, error = %err, "transfer failed");
                TransferEvent::Failed(err)
            }
        };
        // receiver gone means nobody is waiting for the outcome
        let _ = self.events.blocking_send(event);
    }
}

fn spawn<F>(op: &'static str, work: F) -> Transfer
where
    F: FnOnce(&Reporter) -> WalletResult<u64> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();
    let reporter = Reporter {
        events: tx,
        cancel: cancel.clone(),
        pending: Cell::new(None),
    };

    tokio::task::spawn_blocking(move || {
        let result = work(&reporter);
        reporter.finish(op, result);
    });

    Transfer { events: rx, cancel }
}

/// Export every record to `config.path`.
///
/// Progress counts down the records still to write (N-1 .. 0). The file is
/// written to a temporary sibling and only renamed into place on success.
/// Must be called from within a Tokio runtime.
pub fn export(wallet: Arc<Wallet>, config: BackupConfig) -> Transfer {
    spawn("export", move |reporter| run_export(&wallet, &config, reporter))
}

/// Restore every record from `config.path` into `wallet`.
///
/// All inserts share one transaction: a failure or cancellation anywhere
/// leaves the wallet as it was. Progress counts up (1 .. N).
/// Must be called from within a Tokio runtime.
pub fn restore(wallet: Arc<Wallet>, config: BackupConfig) -> Transfer {
    spawn("restore", move |reporter| run_restore(&wallet, &config, reporter))
}

fn run_export(wallet: &Wallet, config: &BackupConfig, reporter: &Reporter) -> WalletResult<u64> {
    reporter.check()?;
    let records = wallet.find_all_records()?;
    let total = records.len() as u64;
    info!(records = total, path = %config.path.display(), "exporting wallet");

    let dir = match config.path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let derivation = KeyDerivationData::generate(config.kdf);
    let master = derivation.derive(&config.passphrase).map_err(crypto_err)?;
    let header = Header::new(derivation, config.chunk_size)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    let mut writer = BackupWriter::new(BufWriter::new(tmp), &header, &master)?;

    let mut remaining = total;
    for record in &records {
        reporter.check()?;
        writer.write_record(&record.to_bytes()?)?;
        remaining -= 1;
        reporter.progress(remaining)?;
    }

    let tmp = writer.finish()?.into_inner().map_err(|e| e.into_error())?;
    tmp.as_file().sync_all()?;
    tmp.persist(&config.path).map_err(|e| WalletError::Io(e.error))?;
    Ok(total)
}

fn run_restore(wallet: &Wallet, config: &BackupConfig, reporter: &Reporter) -> WalletResult<u64> {
    reporter.check()?;
    info!(path = %config.path.display(), "restoring wallet");

    let file = File::open(&config.path)?;
    let mut reader = BackupReader::open(BufReader::new(file), &config.passphrase)?;

    // the store lock is held for the whole transaction
    let restored = wallet.transaction(|conn| {
        let mut restored = 0u64;
        while let Some(bytes) = reader.next_record()? {
            reporter.check()?;
            let record = WalletRecord::from_bytes(&bytes)
                .map_err(|e| WalletError::Format(format!("record {}: {e:#}", restored + 1)))?;
            wallet.insert_record(conn, &record)?;
            restored += 1;
            reporter.progress_nowait(restored)?;
        }
        Ok(restored)
    })?;

    reporter.flush();
    Ok(restored)
}
