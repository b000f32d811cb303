use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use pipefitter::client::GocdClient;
use pipefitter::connection::{ServerConnection, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use pipefitter::sync::{self, PullOutcome, PushOutcome};
use pipefitter::Error;

use super::CmdResult;

// Connection parameters come from the environment, with --host as the
// only per-invocation override. The environment is read here at the
// boundary; core code only ever sees the assembled ServerConnection.
const HOST_ENV: &str = "GOCD_HOST";
const PORT_ENV: &str = "GOCD_PORT";
const USER_ENV: &str = "GOCD_USER";
const PASSWORD_ENV: &str = "GOCD_PASSWORD";
const TIMEOUT_ENV: &str = "GOCD_TIMEOUT_SECS";

#[derive(Args)]
pub struct PipelineArgs {
    #[command(subcommand)]
    command: PipelineCommand,
}

#[derive(Subcommand)]
enum PipelineCommand {
    /// Send a local pipeline definition to the server
    Push {
        /// Path to the pipeline definition file
        path: String,
        /// Pipeline group, required when the pipeline does not exist yet
        group: Option<String>,
        /// GoCD server host, overriding GOCD_HOST
        #[arg(long)]
        host: Option<String>,
    },
    /// Overwrite the local definition file with the server's version
    Pull {
        /// Path to the pipeline definition file
        path: String,
        /// GoCD server host, overriding GOCD_HOST
        #[arg(long)]
        host: Option<String>,
    },
    /// Save a named server pipeline to a local file
    Clone {
        /// Name of the pipeline on the server
        name: String,
        /// Destination file path
        path: String,
        /// GoCD server host, overriding GOCD_HOST
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub command: String,
    #[serde(flatten)]
    pub result: PipelineResultVariant,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum PipelineResultVariant {
    Push(PushOutcome),
    Pull(PullOutcome),
    Clone(CloneOutcome),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutcome {
    pub pipeline: String,
    pub path: String,
}

pub fn run(args: PipelineArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PipelineOutput> {
    match args.command {
        PipelineCommand::Push { path, group, host } => {
            let api = client(host)?;
            let path = expand_path(&path);
            let outcome = sync::push(&api, &path, group.as_deref())?;
            Ok((
                PipelineOutput {
                    command: "pipeline.push".to_string(),
                    result: PipelineResultVariant::Push(outcome),
                },
                0,
            ))
        }
        PipelineCommand::Pull { path, host } => {
            let api = client(host)?;
            let path = expand_path(&path);
            let outcome = sync::pull(&api, &path)?;
            Ok((
                PipelineOutput {
                    command: "pipeline.pull".to_string(),
                    result: PipelineResultVariant::Pull(outcome),
                },
                0,
            ))
        }
        PipelineCommand::Clone { name, path, host } => {
            let api = client(host)?;
            let path = expand_path(&path);
            let fetched = sync::clone_remote(&api, &path, &name)?;
            Ok((
                PipelineOutput {
                    command: "pipeline.clone".to_string(),
                    result: PipelineResultVariant::Clone(CloneOutcome {
                        pipeline: fetched.name,
                        path: path.display().to_string(),
                    }),
                },
                0,
            ))
        }
    }
}

fn client(host_override: Option<String>) -> pipefitter::Result<GocdClient> {
    GocdClient::new(&connection_from_env(host_override)?)
}

fn connection_from_env(host_override: Option<String>) -> pipefitter::Result<ServerConnection> {
    let host = match host_override.or_else(|| env_nonempty(HOST_ENV)) {
        Some(host) => host,
        None => {
            return Err(Error::config_missing_key(HOST_ENV)
                .with_hint("Set GOCD_HOST to the server's hostname, or pass --host"))
        }
    };

    Ok(ServerConnection {
        host,
        port: env_parsed(PORT_ENV, DEFAULT_PORT)?,
        user: env_nonempty(USER_ENV),
        password: env_nonempty(PASSWORD_ENV),
        timeout: Duration::from_secs(env_parsed(TIMEOUT_ENV, DEFAULT_TIMEOUT_SECS)?),
    })
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> pipefitter::Result<T> {
    match env_nonempty(key) {
        Some(raw) => raw
            .parse()
            .map_err(move |_| Error::config_invalid_value(key, Some(raw), "expected a number")),
        None => Ok(default),
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_resolves_tilde() {
        let expanded = expand_path("~/pipelines/build.json");
        assert!(expanded.ends_with("pipelines/build.json"));
        if std::env::var_os("HOME").is_some() {
            assert!(!expanded.to_string_lossy().starts_with('~'));
        }
    }

    #[test]
    fn expand_path_leaves_plain_paths_alone() {
        assert_eq!(
            expand_path("/etc/pipelines/build.json"),
            PathBuf::from("/etc/pipelines/build.json")
        );
    }
}
