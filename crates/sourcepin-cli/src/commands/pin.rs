use super::{input_error, EXIT_SUCCESS};
use crate::progress::ProgressReporter;
use sourcepin_core::{CoreError, Engine, RunObserver, RunOptions, Silent};
use sourcepin_resolve::{CancelToken, CommandRegistry, Mirror, ResolverConfig};
use sourcepin_schema::{parse_references_file, parse_references_str, ExtractedManifest};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

#[derive(Debug, Default)]
pub struct PinArgs {
    pub inputs: Vec<PathBuf>,
    /// `None` writes to stdout.
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub prefer_ecr_public: bool,
    pub prefer_mcr: bool,
    pub registry_tool: Option<String>,
}

impl PinArgs {
    fn mirrors(&self) -> Vec<Mirror> {
        let mut mirrors = Vec::new();
        if self.prefer_ecr_public {
            mirrors.push(Mirror::EcrPublic);
        }
        if self.prefer_mcr {
            mirrors.push(Mirror::Mcr);
        }
        mirrors
    }

    fn resolver_config(&self) -> Result<ResolverConfig, String> {
        let config = match &self.config {
            Some(path) => ResolverConfig::load(path)
                .map_err(|e| input_error(format!("{}: {e}", path.display())))?,
            None => ResolverConfig::default(),
        };
        let mut config = config.with_env_overrides();
        if let Some(tool) = &self.registry_tool {
            config.registry_program.clone_from(tool);
        }
        Ok(config)
    }
}

fn read_manifests(inputs: &[PathBuf]) -> Result<Vec<ExtractedManifest>, String> {
    let mut manifests = Vec::new();
    for input in inputs {
        let file = if input.as_os_str() == "-" {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .map_err(|e| input_error(format!("stdin: {e}")))?;
            parse_references_str(&content).map_err(|e| input_error(format!("stdin: {e}")))?
        } else {
            parse_references_file(input)
                .map_err(|e| input_error(format!("{}: {e}", input.display())))?
        };
        manifests.extend(file.manifests);
    }
    Ok(manifests)
}

fn write_atomic(dest: &Path, content: &str) -> Result<(), String> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| format!("write temp file: {e}"))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("write temp file: {e}"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("fsync temp file: {e}"))?;
    tmp.persist(dest)
        .map_err(|e| format!("persist policy: {}", e.error))?;
    Ok(())
}

pub fn run(args: &PinArgs, cancel: CancelToken) -> Result<u8, String> {
    let manifests = read_manifests(&args.inputs)?;
    let config = args.resolver_config()?;
    let registry = Arc::new(CommandRegistry::new(
        &config.registry_program,
        config.request_timeout(),
    ));
    let engine = Engine::new(config, registry).with_mirrors(args.mirrors());

    let options = RunOptions {
        timeout: args.timeout.map(Duration::from_secs),
        cancel,
    };
    let reporter = console::Term::stderr()
        .is_term()
        .then(ProgressReporter::new);
    let observer: &dyn RunObserver = match &reporter {
        Some(reporter) => reporter,
        None => &Silent,
    };

    let result = engine.pin(&manifests, &options, observer);
    if let Some(reporter) = &reporter {
        reporter.clear();
    }
    let report = result.map_err(|e| match e {
        CoreError::Schema(e) => input_error(e),
        e => e.to_string(),
    })?;

    let mut json = report
        .policy
        .to_json_pretty()
        .map_err(|e| format!("policy serialization failed: {e}"))?;
    json.push('\n');

    match &args.output {
        Some(path) => {
            write_atomic(path, &json)?;
            eprintln!(
                "policy written to {} ({} pinned, {} skipped)",
                path.display(),
                report.policy.rules.len(),
                report.skipped.len()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(json.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|e| format!("failed to write policy: {e}"))?;
        }
    }

    Ok(EXIT_SUCCESS)
}
