use std::path::PathBuf;
use structopt::StructOpt;
use tx_ledger_lib::query::AddressQueryParams;

#[derive(Debug, StructOpt)]
pub struct RunOptions {
    #[structopt(long = "http-addr", help = "Overrides bind address from config")]
    pub http_addr: Option<String>,

    #[structopt(long = "http-port", help = "Overrides port from config")]
    pub http_port: Option<u16>,

    #[structopt(long = "no-http", help = "Run the tracker without the http server")]
    pub no_http: bool,
}

#[derive(Debug, StructOpt)]
pub struct ListOptions {
    #[structopt(long = "address")]
    pub address: String,

    #[structopt(long = "status", help = "unconfirmed, confirmed or error")]
    pub status: Option<String>,

    #[structopt(long = "direction", help = "in or out")]
    pub direction: Option<String>,

    #[structopt(long = "offset")]
    pub offset: Option<String>,

    #[structopt(long = "limit")]
    pub limit: Option<String>,

    #[structopt(long = "order", help = "desc (default) or asc")]
    pub order: Option<String>,
}

impl ListOptions {
    pub fn to_query_params(&self) -> AddressQueryParams {
        AddressQueryParams {
            status: self.status.clone(),
            direction: self.direction.clone(),
            offset: self.offset.clone(),
            limit: self.limit.clone(),
            order: self.order.clone(),
        }
    }
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Run the confirmation tracker and the http server
    #[structopt(name = "run")]
    Run(RunOptions),
    /// Relay a signed transaction and record it in the ledger
    #[structopt(name = "submit")]
    Submit {
        #[structopt(long = "raw", help = "Signed transaction as 0x prefixed hex")]
        raw: String,
    },
    /// Print a page of address history as json
    #[structopt(name = "list")]
    List(ListOptions),
    /// Add address to the watch list
    #[structopt(name = "watch")]
    Watch {
        #[structopt(long = "address")]
        address: String,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "tx_ledger",
    about = "Ethereum transaction ledger and confirmation tracker"
)]
pub struct CliOptions {
    #[structopt(long = "config", default_value = "config-ledger.toml")]
    pub config: PathBuf,

    #[structopt(long = "memory-db", help = "Use memory db, default is file db")]
    pub memory_db: bool,

    #[structopt(subcommand)]
    pub command: Command,
}
