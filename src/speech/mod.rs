//! Speech Output
//!
//! Every utterance interrupts whatever is currently being spoken; phrases are
//! never queued. The synthesizer is an external program (e.g. `espeak-ng`).

use parking_lot::Mutex;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SpeechSettings;

/// Placeholder in synthesizer arguments replaced by the configured locale
pub const LOCALE_PLACEHOLDER: &str = "{locale}";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech synthesizer {program:?} could not be started: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Something that can speak text aloud
pub trait SpeechSink: Send + Sync {
    /// Speak `text`, flushing any utterance in progress
    fn speak(&self, text: &str);

    /// Interrupt the current utterance
    fn stop(&self);

    /// Release the synthesizer; later calls to `speak` are ignored
    fn shutdown(&self);
}

/// Drives an external synthesizer process, one process per utterance
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
    current: Mutex<Option<Child>>,
    shut_down: AtomicBool,
}

impl CommandSpeaker {
    /// Initialize the synthesizer, checking that the program can be launched
    pub fn init(settings: &SpeechSettings) -> Result<Self, SpeechError> {
        let args: Vec<String> = settings
            .args
            .iter()
            .map(|arg| arg.replace(LOCALE_PLACEHOLDER, &settings.locale))
            .collect();

        Command::new(&settings.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| SpeechError::Unavailable {
                program: settings.program.clone(),
                source,
            })?;

        info!(
            "Speech synthesizer {:?} ready (locale {})",
            settings.program, settings.locale
        );

        Ok(Self {
            program: settings.program.clone(),
            args,
            current: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    fn interrupt(current: &mut Option<Child>) {
        if let Some(mut child) = current.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

impl SpeechSink for CommandSpeaker {
    fn speak(&self, text: &str) {
        let mut current = self.current.lock();
        // Read under the lock; shutdown sets it before taking the lock
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        Self::interrupt(&mut current);

        debug!("Speaking: {}", text);
        match Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => *current = Some(child),
            Err(e) => warn!("Failed to speak {:?}: {}", text, e),
        }
    }

    fn stop(&self) {
        Self::interrupt(&mut self.current.lock());
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            self.stop();
            info!("Speech synthesizer shut down");
        }
    }
}

/// Degraded sink used when no synthesizer is available: logs only
#[derive(Debug, Default)]
pub struct LogSpeaker;

impl SpeechSink for LogSpeaker {
    fn speak(&self, text: &str) {
        info!("(speech unavailable) {}", text);
    }

    fn stop(&self) {}

    fn shutdown(&self) {}
}

/// Build the configured speech sink, degrading to [`LogSpeaker`] on failure
pub fn init_speech(settings: &SpeechSettings) -> Box<dyn SpeechSink> {
    if !settings.enabled {
        info!("Speech output disabled");
        return Box::new(LogSpeaker);
    }
    match CommandSpeaker::init(settings) {
        Ok(speaker) => Box::new(speaker),
        Err(e) => {
            tracing::error!("Speech initialization failed: {}", e);
            Box::new(LogSpeaker)
        }
    }
}
