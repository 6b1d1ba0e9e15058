mod options;

use actix_cors::Cors;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use serde_json::json;
use std::env;
use structopt::StructOpt;

use tx_ledger_lib::config::Config;
use tx_ledger_lib::error::TrackerError;
use tx_ledger_lib::eth::{format_address, parse_address};
use tx_ledger_lib::query::{list_transactions, AddressQuery};
use tx_ledger_lib::runtime::{open_store, start_tracker_engine};
use tx_ledger_lib::server::{configure_api, ServerData};
use tx_ledger_lib::service::submit_transaction_hex;
use tx_ledger_lib::setup::TrackerSetup;
use tx_ledger_lib::{err_create, err_custom_create, err_from};

use crate::options::{CliOptions, Command, RunOptions};

async fn run(
    config: &Config,
    db_filename: Option<&str>,
    run_options: RunOptions,
) -> Result<(), TrackerError> {
    let runtime = start_tracker_engine(config, db_filename).await?;
    if run_options.no_http {
        return runtime
            .runtime_handle
            .await
            .map_err(|e| err_custom_create!("Service loop failed: {:?}", e));
    }

    let bind_addr = run_options
        .http_addr
        .unwrap_or_else(|| runtime.setup.bind_addr.clone());
    let port = run_options.http_port.unwrap_or(runtime.setup.port);
    let server_data = Data::new(Box::new(ServerData {
        shared_state: runtime.shared_state.clone(),
        store: runtime.store.clone(),
        oracle: runtime.oracle.clone(),
        setup: runtime.setup.clone(),
    }));

    log::info!("Starting http server on {}:{}", bind_addr, port);
    let server = HttpServer::new(move || {
        let cors = Cors::permissive();
        App::new()
            .wrap(cors)
            .app_data(server_data.clone())
            .configure(configure_api)
    })
    .bind((bind_addr.as_str(), port))
    .map_err(err_from!())?
    .run();

    tokio::select! {
        res = server => res.map_err(err_from!()),
        res = runtime.runtime_handle => {
            res.map_err(|e| err_custom_create!("Service loop failed: {:?}", e))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), TrackerError> {
    if let Err(err) = dotenv::dotenv() {
        return Err(err_custom_create!("No .env file found: {}", err));
    }
    env_logger::init();
    let cli = CliOptions::from_args();
    let config = Config::load(&cli.config)?;
    let db_filename = if cli.memory_db {
        None
    } else {
        Some(
            env::var("DB_SQLITE_FILENAME")
                .map_err(|e| err_custom_create!("DB_SQLITE_FILENAME not set: {}", e))?,
        )
    };

    match cli.command {
        Command::Run(run_options) => run(&config, db_filename.as_deref(), run_options).await,
        Command::Submit { raw } => {
            let setup = TrackerSetup::new(&config)?;
            let store = open_store(db_filename.as_deref()).await?;
            let oracle = setup.create_oracle();
            let tx_hash =
                submit_transaction_hex(&store, &oracle, setup.chain_setup.chain_id, &raw).await?;
            println!("{}", tx_hash);
            Ok(())
        }
        Command::List(list_options) => {
            let query = AddressQuery::parse(&list_options.address, &list_options.to_query_params())
                .map_err(|e| err_create!(e))?;
            let store = open_store(db_filename.as_deref()).await?;
            let txs = list_transactions(&store, &query).await?;
            let out = serde_json::to_string_pretty(&json!({ "transactions": txs }))
                .map_err(|e| err_custom_create!("Failed to serialize transactions: {}", e))?;
            println!("{}", out);
            Ok(())
        }
        Command::Watch { address } => {
            let address = format_address(&parse_address(&address).map_err(|e| err_create!(e))?);
            let store = open_store(db_filename.as_deref()).await?;
            if store.add_watched_address(&address).await? {
                log::info!("Watching address {}", address);
            } else {
                log::info!("Address {} already watched", address);
            }
            Ok(())
        }
    }
}
