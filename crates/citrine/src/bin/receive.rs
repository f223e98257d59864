use citrine::config;
use citrine_log::CitrineLogger;
use citrine_transport::receiver::{self, FileReceiver};
use log::{error, info, logger};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::{env, process};

const OUTPUT_FILE_NAME: &str = "received_data.txt";

fn usage() -> ! {
    eprintln!("usage: receive <server-host> <server-port> <output-prefix>");
    process::exit(1);
}

fn fail(message: String) -> ! {
    error!("{message}");
    logger().flush();
    process::exit(1);
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        usage();
    }
    let Ok(port) = args[2].parse::<u16>() else {
        usage();
    };
    let Some(server) = (args[1].as_str(), port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
    else {
        usage();
    };
    let output = format!("{}{OUTPUT_FILE_NAME}", args[3]);

    let config = match config::handle() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            process::exit(1);
        }
    };
    CitrineLogger::init(config.log_level()).expect("failed to install logger");

    let receiver = match FileReceiver::connect(server).await {
        Ok(receiver) => receiver,
        Err(e) => fail(format!("cannot reach {server}: {e}")),
    };
    let data = match receiver.receive().await {
        Ok(data) => data,
        Err(e) => fail(format!("transfer failed: {e}")),
    };
    if let Err(e) = receiver::write_atomic(Path::new(&output), &data) {
        fail(format!("cannot write {output}: {e}"));
    }
    info!("wrote {} bytes to {output}", data.len());
    logger().flush();
}
