use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use adcensus::candidates;
use adcensus::cli::Cli;
use adcensus::discover;
use adcensus::namegen::NameGen;
use adcensus::pipeline::{self, PipelineConfig};
use adcensus::rootdse;
use adcensus::select;
use adcensus::session::{LdapSessionFactory, SessionFactory};

#[cfg(not(target_os = "windows"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(filter).init();

    info!("adcensus - anonymous Active Directory account enumeration");

    let factory = Arc::new(LdapSessionFactory::new(
        args.port,
        args.tls_mode,
        args.ignore_cert,
    ));
    let servers = resolve_servers(&args, factory.clone()).await?;
    let mut output = candidates::open_output(args.output.as_deref())?;

    if args.dump {
        let mut ldap = factory.open(&servers[0]).await?;
        let attributes = rootdse::dump_root_dse(&mut ldap).await;
        let _ = ldap.unbind().await;
        for (attribute, values) in attributes {
            for value in values {
                writeln!(output, "{attribute}: {value}")?;
            }
        }
        return Ok(());
    }

    let input: Box<dyn Iterator<Item = String> + Send> = match args.generate {
        Some(length) => {
            let generator = NameGen::new(&args.charset, length)?;
            info!("generating {} candidate names", generator.complexity());
            Box::new(generator)
        }
        None => candidates::open_input(args.input.as_deref())?,
    };

    let cfg = PipelineConfig {
        servers,
        parallel: args.parallel,
        throttle: (args.throttle > 0).then(|| Duration::from_millis(args.throttle)),
        session_quota: args.max_requests,
    };
    let report = pipeline::run(cfg, factory, input, output).await?;

    if let Some(reason) = &report.abort {
        warn!("run ended with partial coverage, no new sessions after: {reason}");
    }
    info!(
        fed = report.fed,
        dropped = report.dropped,
        probed = report.probed,
        hits = report.hits,
        "done"
    );
    Ok(())
}

/// Explicit --server lists are used as given; otherwise resolve the domain,
/// look up its controllers and narrow them with the selection strategy.
async fn resolve_servers(args: &Cli, factory: Arc<LdapSessionFactory>) -> Result<Vec<String>> {
    if !args.server.is_empty() {
        return Ok(args.server.clone());
    }

    let domain = match &args.dns_domain {
        Some(domain) => domain.to_lowercase(),
        None => {
            info!("no server supplied, auto-detecting");
            discover::detect_domain()
                .context("domain auto-detection failed, use --dnsdomain or --server")?
        }
    };
    info!(domain = %domain, "looking up domain controllers");

    let discovered = discover::lookup_controllers(&domain).await?;
    if discovered.is_empty() {
        bail!("no domain controllers found for {domain}, use --server");
    }
    info!(
        "discovered {} controller(s): {}",
        discovered.len(),
        discovered.join(", ")
    );

    let factory: Arc<dyn SessionFactory> = factory;
    let chosen = select::choose_servers(
        discovered,
        args.max_servers,
        args.max_strategy,
        factory,
        select::BENCH_WINDOW,
    )
    .await;
    if chosen.is_empty() {
        bail!("server selection yielded no usable servers, use --server");
    }
    info!("using servers: {}", chosen.join(", "));
    Ok(chosen)
}
