use clap::{App, Arg, SubCommand};

use raft_node::codec::Peer;
use raft_node::{Client, Error};

#[tokio::main(basic_scheduler)]
async fn main() -> raft_node::Result<()> {
    let matches = App::new("raft-cli")
        .about("command-line client for a consensus cluster")
        .arg(
            Arg::with_name("node")
                .short("n")
                .long("node")
                .takes_value(true)
                .default_value("127.0.0.1:5001")
                .help("node address as host:port"),
        )
        .subcommand(
            SubCommand::with_name("submit")
                .about("submit a command to the leader")
                .arg(Arg::with_name("command").required(true).multiple(true)),
        )
        .subcommand(SubCommand::with_name("status").about("print the node's status"))
        .get_matches();

    let target: Peer = matches.value_of("node").unwrap().parse()?;
    let client = Client::new(target);

    match matches.subcommand() {
        ("submit", Some(sub)) => {
            let command = sub
                .values_of("command")
                .unwrap()
                .collect::<Vec<_>>()
                .join(" ");
            if client.submit(&command).await? {
                println!("ok");
            } else {
                println!("rejected: that node is not the leader");
            }
        }
        ("status", _) => {
            let status = client.status().await?;
            let rendered = serde_json::to_string_pretty(&status)
                .map_err(|err| Error::Internal(err.to_string()))?;
            println!("{}", rendered);
        }
        _ => {
            eprintln!("specify a subcommand, see --help");
        }
    }
    Ok(())
}
