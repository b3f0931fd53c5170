use clap::Parser;
use color_eyre::eyre::Result;
use log::{error, warn};
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use vcs_proxy::config::{Args, Config};
use vcs_proxy::error::{VcsError, VcsResult};
use vcs_proxy::logging;
use vcs_proxy::proxy::{self, ProxyRequest, ProxyResponse};
use vcs_proxy::vcs::Registry;

include!(concat!(env!("OUT_DIR"), "/git_sha.rs"));

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.version {
        println!(
            "vcs-proxy version {} (git: {GIT_SHA})",
            env!("CARGO_PKG_VERSION")
        );
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(args.config.as_deref())?;
    let final_config = config.merge_with_args(&args);

    logging::init_logging(final_config.debug.unwrap_or(false))?;
    color_eyre::install()?;

    let request = ProxyRequest {
        commit_hash: args.commit_hash.clone(),
        commit_link: args.commit_link.clone(),
        repo_url: args.repo_url.clone(),
        item_hash: args.item_hash.clone(),
        item_path: args.item_path.clone(),
    };
    log::debug!("Handling {request:?}");

    let outcome = Registry::from_config(&final_config)
        .and_then(|registry| serve(&args, &registry, &request));

    let mut stdout = io::stdout().lock();
    match outcome {
        Ok(ProxyResponse::Commit(result)) => {
            writeln!(stdout, "{}", result.to_json()?)?;
            Ok(ExitCode::SUCCESS)
        }
        Ok(ProxyResponse::File(content)) => {
            stdout.write_all(&content)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Request failed with {}: {e}", e.status_code());
            writeln!(stdout, "{}", serde_json::to_string(&e.to_body())?)?;
            Ok(exit_code(&e))
        }
    }
}

fn serve(args: &Args, registry: &Registry, request: &ProxyRequest) -> VcsResult<ProxyResponse> {
    let cache_path = match args.tree_cache.as_deref() {
        Some(path) if !request.is_file_request() => path,
        _ => return proxy::handle(registry, request),
    };

    let cached = fs::read_to_string(cache_path).ok();
    let (result, blob) = proxy::load_tree(registry, cached.as_deref(), request)?;
    if let Some(blob) = blob {
        if let Err(e) = fs::write(cache_path, blob) {
            warn!("Can't write tree cache {}: {e}", cache_path.display());
        }
    }
    Ok(ProxyResponse::Commit(result))
}

fn exit_code(error: &VcsError) -> ExitCode {
    if error.is_client_error() {
        ExitCode::from(4)
    } else {
        ExitCode::from(5)
    }
}
