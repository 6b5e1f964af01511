use anyhow::Result;
use log::{error, info, warn};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use crate::domain::email::MessageId;
use crate::rewrite::message::{HeaderOutcome, MessageRewriter, RewrittenMessage};
use crate::store::repo::{MailStore, StoreError};

pub struct DaemonConfig {
    pub source: String,
    pub dest: String,
    pub backup: String,
    pub search: String,
    pub dry_run: bool,
    pub repeat: bool,
    pub interval_secs: u64,
}

/// Rewrites one message. Returns whether it was (or, in a dry run, would be)
/// rewritten.
///
/// The rewritten copy is appended before the original is backed up and
/// deleted, so a crash part way leaves at worst a duplicate in `dest`.
pub fn process_message(
    store: &mut dyn MailStore,
    rewriter: &MessageRewriter,
    id: MessageId,
    cfg: &DaemonConfig,
) -> Result<bool> {
    let fetched = store.fetch(id)?;
    let out = rewriter.rewrite(&fetched.raw)?;
    log_outcome(id, "Subject", &out.subject);
    log_outcome(id, "From", &out.from);

    if !out.changed() {
        warn!(
            "Message_id {id}, subject {:?} skipped.",
            out.subject.original().unwrap_or_default()
        );
        return Ok(false);
    }

    if cfg.dry_run {
        println!("Message {id} changed:");
        print!("{}", header_diff(&out));
        return Ok(true);
    }

    store.append(&cfg.dest, &out.bytes, &fetched.flags, fetched.arrival)?;
    store.copy(id, &cfg.backup)?;
    store.delete(id)?;
    Ok(true)
}

/// One pass over the source folder. Per-message failures are logged and
/// skipped; the returned count is the number of rewritten messages.
pub fn run_pass(
    store: &mut dyn MailStore,
    rewriter: &MessageRewriter,
    cfg: &DaemonConfig,
) -> Result<usize> {
    let ids = match store
        .select(&cfg.source)
        .and_then(|()| store.search(&cfg.search))
    {
        Ok(ids) => ids,
        Err(e) => {
            if let Err(close_err) = store.close() {
                warn!("Closing after a failed search: {close_err:#}");
            }
            return Err(e);
        }
    };
    info!("Looking at {} messages.", ids.len());

    let mut count = 0;
    for id in ids {
        match process_message(store, rewriter, id, cfg) {
            Ok(true) => count += 1,
            Ok(false) => {}
            Err(e) if matches!(e.downcast_ref::<StoreError>(), Some(StoreError::NotFound(_))) => {
                warn!("Message_id {id} vanished before it could be fetched.");
            }
            Err(e) => error!("Message_id {id} failed: {e:#}"),
        }
    }

    store.close()?;
    info!("Rewrote {count} messages.");
    Ok(count)
}

/// Runs one pass per fresh connection from `connect`; with `cfg.repeat`,
/// keeps going every `interval_secs` until Ctrl-C.
pub fn run_daemon<S, F>(mut connect: F, rewriter: &MessageRewriter, cfg: &DaemonConfig) -> Result<()>
where
    S: MailStore,
    F: FnMut() -> Result<S>,
{
    let running = Arc::new(AtomicBool::new(true));
    if cfg.repeat {
        let r2 = running.clone();
        ctrlc::set_handler(move || {
            r2.store(false, Ordering::SeqCst);
        })?;
    }

    loop {
        let pass = connect().and_then(|mut store| run_pass(&mut store, rewriter, cfg));
        if let Err(e) = pass {
            error!("Exception during processing: {e:#}");
        }

        if !cfg.repeat {
            return Ok(());
        }
        info!("Sleeping for {} seconds.", cfg.interval_secs);
        for _ in 0..cfg.interval_secs {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_secs(1));
        }
        if !running.load(Ordering::SeqCst) {
            info!("Interrupted; stopping.");
            return Ok(());
        }
    }
}

fn log_outcome(id: MessageId, name: &str, outcome: &HeaderOutcome) {
    if let HeaderOutcome::Rewritten {
        original,
        rewritten,
    } = outcome
    {
        info!("[{id}] {name}: {original:?} -> {rewritten:?}");
    }
}

/// `-`/`+` lines for every header the rewrite changed.
pub fn header_diff(out: &RewrittenMessage) -> String {
    let mut diff = String::new();
    for (name, outcome) in [("Subject", &out.subject), ("From", &out.from)] {
        if let HeaderOutcome::Rewritten {
            original,
            rewritten,
        } = outcome
        {
            diff.push_str(&format!("-{name}: {original}\n+{name}: {rewritten}\n"));
        }
    }
    diff
}
