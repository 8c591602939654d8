//! sortd - produce sorter daemon
//!
//! This daemon:
//! 1. Loads configuration (file + env + flags)
//! 2. Opens the frame source and classifier
//! 3. Runs the capture loop in the background
//! 4. Runs sorting sessions: arm, wait for the next detection, print it as
//!    one JSON line on stdout and remember its seq for dedup

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use sort_kernel::config::SorterdConfig;
use sort_kernel::{
    open_source, CancelToken, CaptureHandle, Classifier, ClassifierAdapter, Engine,
    SceneClassifier, SortRecord, WaitOutcome,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Produce sorter detection daemon")]
struct Args {
    /// JSON config file. Defaults to $SORTER_CONFIG when set.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame source URL (stub://..., http://...). Overrides the config file.
    #[arg(long)]
    source: Option<String>,

    /// Number of sorting sessions to run; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 0)]
    sessions: u64,

    /// Crop the operator is sorting; used when the classifier label is ambiguous.
    #[arg(long)]
    target_crop: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => SorterdConfig::load_from(path)?,
        None => SorterdConfig::load()?,
    };
    if let Some(url) = args.source {
        cfg.source.url = url;
    }
    if let Some(crop) = args.target_crop {
        cfg.session.target_crop = crop;
    }
    cfg.validate()?;

    let engine = Arc::new(Engine::new(cfg.gate.clone()).with_poll_interval(cfg.session.poll_interval));
    engine.set_target_crop(&cfg.session.target_crop);

    let source = open_source(&cfg.source)?;
    let adapter = ClassifierAdapter::from_boxed(build_classifier(&cfg)?);
    let capture = CaptureHandle::new(Arc::clone(&engine), cfg.capture.clone());
    capture.start(source, adapter)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let cancel = CancelToken::new();
    {
        let shutdown = Arc::clone(&shutdown);
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            cancel.cancel();
        })
        .context("error setting Ctrl-C handler")?;
    }

    let triggers = if cfg.session.auto_arm {
        None
    } else {
        log::info!("manual arming: press Enter to arm each session");
        Some(spawn_stdin_triggers())
    };

    log::info!(
        "sortd running. source={} target_crop={} timeout={:?}",
        cfg.source.url,
        cfg.session.target_crop,
        cfg.session.wait_timeout
    );

    let mut last_saved_seq: Option<u64> = None;
    let mut completed = 0u64;
    while !shutdown.load(Ordering::SeqCst) && (args.sessions == 0 || completed < args.sessions) {
        if let Some(rx) = &triggers {
            match rx.recv_timeout(cfg.session.poll_interval) {
                Ok(()) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    log::info!("operator input closed");
                    break;
                }
            }
        }

        let token = engine.arm();
        match engine.wait_for_next_cancellable(
            token,
            last_saved_seq,
            cfg.session.wait_timeout,
            &cancel,
        ) {
            WaitOutcome::Detected(event) => {
                let record = SortRecord::from_event(&event, &engine.target_crop())
                    .ok_or_else(|| anyhow!("detection {} is not present", event.seq))?;
                println!("{}", serde_json::to_string(&record)?);
                last_saved_seq = Some(record.seq);
                log::info!(
                    "session {}: {} {} {} -> {} (seq={})",
                    completed + 1,
                    record.crop_type,
                    record.condition,
                    record.color,
                    record.sorted_to,
                    record.seq
                );
            }
            WaitOutcome::Timeout => {
                log::info!(
                    "session {}: no crop observed within {:?}",
                    completed + 1,
                    cfg.session.wait_timeout
                );
            }
            WaitOutcome::Cancelled => break,
        }
        completed += 1;
    }

    log::info!("shutting down after {} sessions", completed);
    capture.stop()?;
    Ok(())
}

fn build_classifier(cfg: &SorterdConfig) -> Result<Box<dyn Classifier>> {
    let settings = &cfg.classifier;
    let Some(model_path) = &settings.model_path else {
        log::info!("no model configured; using scene classifier");
        return Ok(Box::new(SceneClassifier::new(
            &cfg.session.target_crop,
            settings.presence_min_conf,
        )));
    };

    #[cfg(feature = "backend-tract")]
    {
        let labels_path = settings
            .labels_path
            .as_ref()
            .ok_or_else(|| anyhow!("labels_path is required with model_path"))?;
        let classifier = sort_kernel::OnnxClassifier::load(
            model_path,
            labels_path,
            settings.preprocess_path.as_ref(),
            settings.presence_min_conf,
        )?;
        Ok(Box::new(classifier))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(anyhow!(
            "model {} requires the backend-tract feature",
            model_path.display()
        ))
    }
}

/// One `()` per line the operator enters on stdin.
fn spawn_stdin_triggers() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() || tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}
