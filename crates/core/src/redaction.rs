//! Secret redaction for pipeline output and error bodies
//!
//! Everything the tool prints to stdout ends up in a build log that is readable
//! by anyone with access to the pipeline. The API token, and any other value
//! registered here, is replaced with a placeholder before it is written.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::sync::{Arc, RwLock};

/// Minimum length for a value to be considered for redaction
pub const MIN_REDACTION_LENGTH: usize = 8;

/// Replacement text for redacted secrets
pub const REDACTION_PLACEHOLDER: &str = "****";

/// Thread-safe registry of secret values
#[derive(Debug, Clone, Default)]
pub struct SecretRegistry {
    inner: Arc<RwLock<BTreeSet<String>>>,
}

impl SecretRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret; values shorter than [`MIN_REDACTION_LENGTH`] are ignored
    pub fn add_secret(&self, secret: &str) {
        if secret.len() < MIN_REDACTION_LENGTH {
            return;
        }
        if let Ok(mut inner) = self.inner.write() {
            inner.insert(secret.to_string());
        }
    }

    /// Replace every registered secret in `text`
    ///
    /// Longer secrets are replaced first so a secret that contains another one
    /// is masked as a whole.
    pub fn redact_text(&self, text: &str) -> String {
        let Ok(inner) = self.inner.read() else {
            return text.to_string();
        };
        let mut secrets: Vec<&String> = inner.iter().collect();
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut result = text.to_string();
        for secret in secrets {
            if result.contains(secret.as_str()) {
                result = result.replace(secret.as_str(), REDACTION_PLACEHOLDER);
            }
        }
        result
    }

    pub fn secret_count(&self) -> usize {
        self.inner.read().map(|inner| inner.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.clear();
        }
    }
}

static GLOBAL_REGISTRY: once_cell::sync::Lazy<SecretRegistry> =
    once_cell::sync::Lazy::new(SecretRegistry::new);

/// Process-wide registry, fed by the CLI at startup
pub fn global_registry() -> &'static SecretRegistry {
    &GLOBAL_REGISTRY
}

pub fn add_global_secret(secret: &str) {
    global_registry().add_secret(secret);
}

/// Configuration for redaction behavior
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub enabled: bool,
    /// Registry to use instead of the global one (primarily for testing)
    pub custom_registry: Option<SecretRegistry>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_registry: None,
        }
    }
}

impl RedactionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            custom_registry: None,
        }
    }

    pub fn with_custom_registry(registry: SecretRegistry) -> Self {
        Self {
            enabled: true,
            custom_registry: Some(registry),
        }
    }

    fn registry(&self) -> &SecretRegistry {
        self.custom_registry
            .as_ref()
            .unwrap_or_else(|| global_registry())
    }
}

/// Redact `text` if redaction is enabled in `config`
pub fn redact_if_enabled(text: &str, config: &RedactionConfig) -> String {
    if !config.enabled {
        return text.to_string();
    }
    config.registry().redact_text(text)
}

/// A writer that applies redaction at line boundaries
///
/// Partial lines are buffered until a newline arrives (or the writer is
/// flushed) so a secret split across two `write` calls is still masked.
#[derive(Debug)]
pub struct RedactingWriter<W> {
    inner: W,
    buffer: Vec<u8>,
    config: RedactionConfig,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(writer: W, config: RedactionConfig) -> Self {
        Self {
            inner: writer,
            buffer: Vec::new(),
            config,
        }
    }

    /// Write `line` plus a newline and flush
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write_all(line.as_bytes())?;
        self.write_all(b"\n")?;
        self.flush()
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn emit(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        match String::from_utf8(bytes) {
            Ok(text) => {
                let redacted = redact_if_enabled(&text, &self.config);
                self.inner.write_all(redacted.as_bytes())
            }
            // Not UTF-8: pass through untouched
            Err(err) => self.inner.write_all(err.as_bytes()),
        }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.emit(line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let remaining: Vec<u8> = self.buffer.drain(..).collect();
            self.emit(remaining)?;
        }
        self.inner.flush()
    }
}
