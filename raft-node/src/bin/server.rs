use clap::{App, Arg};

use raft_node::{server, ClusterConfig, Error};

#[tokio::main]
async fn main() -> raft_node::Result<()> {
    tracing_subscriber::fmt::try_init().map_err(|err| Error::Internal(err.to_string()))?;

    let matches = App::new("raft-server")
        .about("a replicated key-value consensus node")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .required(true)
                .help("cluster configuration file"),
        )
        .get_matches();

    let config = ClusterConfig::load(matches.value_of("config").unwrap())?;
    server::run(config, tokio::signal::ctrl_c()).await
}
