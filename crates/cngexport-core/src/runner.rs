use crate::error::{KspError, Result};
use crate::export::{ExportOptions, KeyExporter, KeyHandle, KeyName};
use crate::policy::PolicyOverride;
use crate::provider::KeyStorageProvider;
use crate::session::ProviderSession;
use crate::sink::PemFileSink;
use cngexport_config::AppConfig;
use std::io::Write;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Enumerate { long: bool },
    Export(KeyName),
}

impl Mode {
    /// No name lists keys, one name exports it, anything more is a usage error.
    pub fn from_args(names: &[String], long: bool) -> Result<Self> {
        match names {
            [] => Ok(Mode::Enumerate { long }),
            [name] => Ok(Mode::Export(KeyName::new(name.as_str())?)),
            _ => Err(KspError::Usage { count: names.len() }),
        }
    }
}

/// A loaded provider back-end together with its policy override.
pub struct Backend<P: KeyStorageProvider, O: PolicyOverride> {
    pub provider: P,
    pub policy: O,
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub provider_name: String,
    pub export: ExportOptions,
    pub output_dir: PathBuf,
    pub overwrite: bool,
}

impl From<&AppConfig> for RunOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            provider_name: cfg.provider.name.clone(),
            export: ExportOptions {
                format: cfg.export.format,
                override_policy: cfg.export.override_policy,
            },
            output_dir: cfg.export.output_dir.clone(),
            overwrite: cfg.export.overwrite,
        }
    }
}

/// Turns the positional names into a [`Mode`], reporting a bad command line
/// on `err` and returning its exit code instead.
///
/// Nothing else (config, logging, provider) has to be set up for this.
pub fn resolve_mode<E: Write>(
    names: &[String],
    long: bool,
    err: &mut E,
) -> std::result::Result<Mode, u8> {
    Mode::from_args(names, long).map_err(|e| report(&e, err))
}

/// Runs one invocation and returns the process exit code.
///
/// Failures are reported once on `err`.
pub fn execute<P, O, L, W, E>(
    mode: &Mode,
    options: &RunOptions,
    load: L,
    out: &mut W,
    err: &mut E,
) -> u8
where
    P: KeyStorageProvider,
    O: PolicyOverride,
    L: FnOnce() -> Result<Backend<P, O>>,
    W: Write,
    E: Write,
{
    match load().and_then(|backend| run(mode, &backend, options, out)) {
        Ok(()) => 0,
        Err(e) => report(&e, err),
    }
}

fn report<E: Write>(e: &KspError, err: &mut E) -> u8 {
    tracing::error!(error = %e, "run failed");
    let _ = writeln!(err, "{e}");
    if let KspError::Usage { .. } = e {
        let _ = writeln!(err, "usage: cngexport [OPTIONS] [KEY_NAME]");
    }
    e.exit_code()
}

pub fn run<P, O, W>(
    mode: &Mode,
    backend: &Backend<P, O>,
    options: &RunOptions,
    out: &mut W,
) -> Result<()>
where
    P: KeyStorageProvider,
    O: PolicyOverride,
    W: Write,
{
    let session = ProviderSession::open(&backend.provider, &options.provider_name)?;
    match mode {
        Mode::Enumerate { long } => list_keys(&session, *long, out)?,
        Mode::Export(name) => export_key(&session, &backend.policy, name, options, out)?,
    }
    session.close();
    Ok(())
}

fn list_keys<P: KeyStorageProvider, W: Write>(
    session: &ProviderSession<'_, P>,
    long: bool,
    out: &mut W,
) -> Result<()> {
    let mut count = 0usize;
    for entry in session.keys() {
        let entry = entry?;
        let line = if long {
            writeln!(out, "{}\t{}", entry.name, entry.algorithm)
        } else {
            writeln!(out, "{}", entry.name)
        };
        line.map_err(stdout_error)?;
        count += 1;
    }
    tracing::info!(count, "keys enumerated");
    Ok(())
}

fn export_key<P, O, W>(
    session: &ProviderSession<'_, P>,
    policy: &O,
    name: &KeyName,
    options: &RunOptions,
    out: &mut W,
) -> Result<()>
where
    P: KeyStorageProvider,
    O: PolicyOverride,
    W: Write,
{
    let exporter = KeyExporter::new(policy, options.export);
    let key = KeyHandle::open(session, name)?;
    if exporter.ensure_exportable(&key)? {
        writeln!(out, "Marking key as exportable ...").map_err(stdout_error)?;
    }
    let len = exporter.query_size(&key)?;
    writeln!(out, "Key blob length: {len}").map_err(stdout_error)?;
    let blob = exporter.fill(&key, len)?;
    drop(key);

    let sink = PemFileSink::new(&options.output_dir, options.overwrite);
    let path = sink.write(name, blob.as_bytes())?;
    writeln!(out, "Wrote key blob to: {}", path.display()).map_err(stdout_error)?;
    Ok(())
}

fn stdout_error(e: std::io::Error) -> KspError {
    KspError::io("<stdout>", e)
}
