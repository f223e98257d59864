use bytes::Bytes;
use citrine::config;
use citrine_log::CitrineLogger;
use citrine_transport::congestion::FixedWindow;
use citrine_transport::sender::FileSender;
use log::{error, logger};
use std::net::ToSocketAddrs;
use std::{env, fs, process};

fn usage() -> ! {
    eprintln!("usage: send-fixed <bind-host> <bind-port> <window-bytes>");
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
    let Ok(window) = args[3].parse::<usize>() else {
        usage();
    };
    let Some(addr) = (args[1].as_str(), port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
    else {
        usage();
    };

    let config = match config::handle() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            process::exit(1);
        }
    };
    CitrineLogger::init(config.log_level()).expect("failed to install logger");

    let data = match fs::read(&config.transfer.data_file) {
        Ok(data) => Bytes::from(data),
        Err(e) => fail(format!("cannot read {}: {e}", config.transfer.data_file)),
    };

    let sender = match FileSender::bind(addr, data, FixedWindow::new(window)).await {
        Ok(sender) => sender,
        Err(e) => fail(format!("cannot bind {addr}: {e}")),
    };
    if let Err(e) = sender.serve().await {
        fail(format!("transfer failed: {e}"));
    }
    logger().flush();
}
