//! APIC query tool
//!
//! Runs one read query and prints the response.
//!
//! ```text
//! aci-query <path> [filter] [--<query-parameter>=<value>...] [--format=json|xml]
//! aci-query fvTenant name=common --rsp-subtree=children
//! ```
//!
//! Connection settings come from `ACI_ADDRESS` and the `ACI_*` variables
//! read by [`SessionConfig::from_env`].

use aci_client::{Format, Query, Session, SessionConfig};
use anyhow::{Context, bail};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: aci-query <path> [filter] [--<query-parameter>=<value>...] [--format=json|xml]");
    };

    let mut query = Query::new(&path)?;
    let mut format = Format::Json;
    for arg in args {
        match arg.strip_prefix("--") {
            Some(option) => {
                let (key, value) = option
                    .split_once('=')
                    .with_context(|| format!("expected --<name>=<value>, got {arg}"))?;
                if key == "format" {
                    format = value.parse()?;
                } else {
                    query.set(key, value)?;
                }
            }
            None => query.set("query-target-filter", &arg)?,
        }
    }

    let address = env::var("ACI_ADDRESS").context("ACI_ADDRESS environment variable is required")?;
    let config = SessionConfig::from_env()?;
    info!("Querying {} on {}", path, address);

    let mut session = Session::connect(&address, &config)?;
    session.login(None, None)?;
    let output = query.execute(&mut session)?;
    println!("{}", output.render(None, format)?);

    session.logout()?;
    Ok(())
}
