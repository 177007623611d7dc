#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate loggerv;

extern crate deployer;

#[allow(unused_imports)]
use deployer::*;

#[allow(unused_imports)]
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::process;

use deployer_core::Config;
use tokio::runtime::Runtime;

fn print_error_debug(e: &Error) {
    use std::env;
    if env::var("CI").is_ok() {
        warn!("{:?}", e);
    } else {
        for e in e.iter().skip(1) {
            warn!("caused by: {}", e);
        }
    }
}

fn result_exit<T>(name: &str, x: Result<T>) {
    let _ = x.map_err(|e| {
        println!();
        error!("{} error: {}", name, e);
        print_error_debug(&e);
        process::exit(1);
    });
    process::exit(0);
}

/// Build the live `Orchestrator` from process configuration: this is the
/// only place in the CLI binary that touches environment variables or
/// constructs the real cluster/discovery-store/blob clients (spec.md §9
/// "Global module state becomes a `Config` value constructed at startup").
async fn build_orchestrator(cfg: &Config) -> Result<Orchestrator> {
    let gateway = ClusterGateway::from_config(cfg).await?;
    let primary = gateway.get(&cfg.primary_context)?.client.clone();
    let secondary = match &cfg.secondary_context {
        Some(ctx) => Some(gateway.get(ctx)?.client.clone()),
        None => None,
    };

    let blobs = BlobStore::new(cfg);
    let node_pools = blobs.fetch_node_pools().await?;

    let store = DiscoveryStore::connect(cfg)?;
    let manifests = ManifestService::new(BlobStore::new(cfg), primary.clone(), cfg.serving_namespace.clone());
    let exposure = ExposureLayer::new(primary.clone(), secondary, cfg.serving_namespace.clone());
    let readiness = ReadinessGate::new();
    let placement = PlacementEngine::default();
    let inventory = ResourceInventory::new(primary, cfg.serving_namespace.clone(), node_pools);

    Ok(Orchestrator::new(Box::new(store), Box::new(manifests), Box::new(exposure), Box::new(readiness), placement, Box::new(inventory)))
}

async fn run_start(cfg: &Config, model_id: &str, model_name: &str, model_repo_id: &str, model_type: &str, cross_cluster: bool) -> Result<()> {
    let orchestrator = build_orchestrator(cfg).await?;
    let req = ModelRequest {
        model_id: model_id.to_string(),
        model_name: model_name.to_string(),
        model_repo_id: model_repo_id.to_string(),
        model_type: model_type.to_string(),
        cross_cluster,
        ingress_host: None,
    };
    let outcome = orchestrator.start(&req).await?;
    if outcome.degraded {
        warn!("model '{}' is active but degraded: {}", model_name, outcome.ip);
    } else {
        info!("model '{}' is active at {}", model_name, outcome.ip);
    }
    Ok(())
}

async fn run_stop(cfg: &Config, model_id: &str, model_name: &str) -> Result<()> {
    let orchestrator = build_orchestrator(cfg).await?;
    orchestrator.stop(model_id, model_name).await?;
    info!("model '{}' stopped", model_id);
    Ok(())
}

async fn run_inventory(cfg: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(cfg).await?;
    let snapshot = orchestrator.inventory.snapshot().await?;
    for pool in &snapshot.pools {
        println!(
            "{}: base cpu={:.2} mem_gib={:.2} gpu={} (extra headroom cpu={:.2} mem_gib={:.2} gpu={})",
            pool.name,
            pool.totals.base.cpu_cores,
            pool.totals.base.mem_gib,
            pool.totals.base.gpu_count,
            pool.totals.extra.cpu_cores,
            pool.totals.extra.mem_gib,
            pool.totals.extra.gpu_count,
        );
    }
    Ok(())
}

async fn run_dump(cfg: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(cfg).await?;
    for state in deployer_core::LifecycleState::all() {
        for (id, record) in orchestrator.store.list(state).await? {
            println!("{}/{}: {}", state.path_segment(), id, record.ip);
        }
    }
    Ok(())
}

/// Pod-level debug helper: dumps residents and their status for a model,
/// so an operator can see why a deployment isn't converging (spec.md §11
/// "Pod-level debug helper", grounded on `shipcat_cli::kube::debug` and
/// `ResourceInventory::residents`).
async fn run_debug(cfg: &Config, model_name: &str) -> Result<()> {
    let orchestrator = build_orchestrator(cfg).await?;
    let residents = orchestrator.inventory.residents().await?;
    let mut found = false;
    for (pool, models) in residents {
        for m in models.iter().filter(|m| m.name == model_name) {
            found = true;
            println!(
                "pool={} node={} status={} cpu={:.2} mem_gib={:.2} gpu={}",
                pool, m.node, m.status, m.resources.cpu_cores, m.resources.mem_gib, m.resources.gpu_count
            );
        }
    }
    if !found {
        println!("no residents found for '{}'", model_name);
    }
    Ok(())
}

fn main() {
    let app = App::new("deployer")
        .version(crate_version!())
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::DeriveDisplayOrder)
        .global_settings(&[AppSettings::ColoredHelp])
        .about("Operator CLI for the model-deployer control plane")
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase verbosity"))
        .arg(Arg::with_name("debug").short("d").long("debug").help("Adds line numbers to log statements"))
        .subcommand(
            SubCommand::with_name("start")
                .about("Start a model deployment")
                .arg(Arg::with_name("model-id").long("model-id").takes_value(true).required(true))
                .arg(Arg::with_name("model-name").long("model-name").takes_value(true).required(true))
                .arg(Arg::with_name("model-repo-id").long("model-repo-id").takes_value(true).required(true))
                .arg(Arg::with_name("model-type").long("model-type").takes_value(true).required(true))
                .arg(Arg::with_name("cross-cluster").long("cross-cluster")),
        )
        .subcommand(
            SubCommand::with_name("stop")
                .about("Stop a model deployment")
                .arg(Arg::with_name("model-id").long("model-id").takes_value(true).required(true))
                .arg(Arg::with_name("model-name").long("model-name").takes_value(true).required(true)),
        )
        .subcommand(SubCommand::with_name("inventory").about("Show per-pool resource totals"))
        .subcommand(SubCommand::with_name("dump").about("Dump the discovery store's znode contents"))
        .subcommand(
            SubCommand::with_name("debug")
                .about("Show pod-level status for a model's residents")
                .arg(Arg::with_name("model-name").required(true)),
        );

    let args = app.get_matches();

    loggerv::Logger::new()
        .verbosity(args.occurrences_of("verbose") + 1)
        .module_path(false)
        .line_numbers(args.is_present("debug"))
        .init()
        .unwrap();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("configuration error: {}", e);
            process::exit(1);
        }
    };

    let mut rt = Runtime::new().expect("failed to start tokio runtime");

    if let Some(a) = args.subcommand_matches("start") {
        let res = rt.block_on(run_start(
            &cfg,
            a.value_of("model-id").unwrap(),
            a.value_of("model-name").unwrap(),
            a.value_of("model-repo-id").unwrap(),
            a.value_of("model-type").unwrap(),
            a.is_present("cross-cluster"),
        ));
        result_exit("start", res);
    }
    if let Some(a) = args.subcommand_matches("stop") {
        let res = rt.block_on(run_stop(&cfg, a.value_of("model-id").unwrap(), a.value_of("model-name").unwrap()));
        result_exit("stop", res);
    }
    if args.subcommand_matches("inventory").is_some() {
        let res = rt.block_on(run_inventory(&cfg));
        result_exit("inventory", res);
    }
    if args.subcommand_matches("dump").is_some() {
        let res = rt.block_on(run_dump(&cfg));
        result_exit("dump", res);
    }
    if let Some(a) = args.subcommand_matches("debug") {
        let res = rt.block_on(run_debug(&cfg, a.value_of("model-name").unwrap()));
        result_exit("debug", res);
    }

    unreachable!("Subcommand valid, but not implemented");
}
