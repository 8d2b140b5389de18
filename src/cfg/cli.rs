// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const USAGE: &str = "Options:\n\t-p (port)\n\t-c (config file)\n\t-h display this help and exit";

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum CliAction {
    Run(CliArgs),
    Help,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Overrides the configured listen port.
    pub port: Option<u16>,
    /// Optional YAML config file.
    pub config: Option<PathBuf>,
}

/// Parses the process arguments (without the program name).
pub fn parse_args<I>(args: I) -> Result<CliAction>
where I: IntoIterator<Item = String> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-p" => {
                let value = args.next().context("option -p requires a port")?;
                parsed.port =
                    Some(value.parse().with_context(|| {
                        format!("invalid port {value:?} for option -p")
                    })?);
            },
            "-c" => {
                let value = args.next().context("option -c requires a file")?;
                parsed.config = Some(PathBuf::from(value));
            },
            "-h" => return Ok(CliAction::Help),
            other => bail!("invalid option {other:?}, use -h for help"),
        }
    }
    Ok(CliAction::Run(parsed))
}

pub fn resolve_config_path<P: AsRef<Path>>(rel: P) -> Result<PathBuf> {
    let p = rel.as_ref();

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}
