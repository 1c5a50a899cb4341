// client-demo: interactive console client for the messenger server.
//
// Connects, registers (when --nick is given) or authenticates, then sends
// every stdin line of the form `<uid> <text>` as a direct message.  Every
// frame the server pushes is printed as-is.

use clap::{Arg, Command};
use courier_protocol::FrameDecoder;
use serde_json::{Value, json};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;

async fn print_frames(mut read_half: OwnedReadHalf) {
    let mut decoder: FrameDecoder<Value> = FrameDecoder::new();
    let mut chunk = [0u8; 4096];
    loop {
        loop {
            match decoder.next() {
                Ok(Some(frame)) => println!("<- {frame}"),
                Ok(None) => break,
                Err(e) => {
                    eprintln!("Undecodable server frame: {e}");
                    return;
                }
            }
        }
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                eprintln!("Server closed the connection");
                return;
            }
            Ok(n) => decoder.extend(&chunk[..n]),
            Err(e) => {
                eprintln!("Read error: {e}");
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = Command::new("Courier Demo Client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Console client for the messenger server")
        .arg(
            Arg::new("server")
                .help("Server address, e.g. 127.0.0.1:7777")
                .long("server")
                .default_value("127.0.0.1:7777"),
        )
        .arg(
            Arg::new("login")
                .help("Login to authenticate as")
                .long("login")
                .required(true),
        )
        .arg(
            Arg::new("pass")
                .help("Password")
                .long("pass")
                .required(true),
        )
        .arg(
            Arg::new("nick")
                .help("Register a new account with this nickname instead of authenticating")
                .long("nick"),
        )
        .get_matches();

    let server = matches.get_one::<String>("server").expect("has default");
    let login = matches.get_one::<String>("login").expect("required");
    let pass = matches.get_one::<String>("pass").expect("required");
    let nick = matches.get_one::<String>("nick");

    let stream = match TcpStream::connect(server.as_str()).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Failed to connect to {server}: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Connected to {server}");
    let (read_half, mut write_half) = stream.into_split();
    let mut printer = tokio::spawn(print_frames(read_half));

    let hello = match nick {
        Some(nick) => json!({ "action": "register",
            "data": { "login": login, "pass": pass, "nick": nick } }),
        None => json!({ "action": "auth", "data": { "login": login, "pass": pass } }),
    };
    if let Err(e) = write_half.write_all(hello.to_string().as_bytes()).await {
        eprintln!("Failed to send credentials: {e}");
        return ExitCode::FAILURE;
    }

    // `<uid> <text>` per line; everything after the first space is the body.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = &mut printer => return ExitCode::SUCCESS,
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { return ExitCode::SUCCESS };
                let Some((uid, body)) = line.split_once(' ') else {
                    eprintln!("Usage: <uid> <text>");
                    continue;
                };
                let request = json!({ "action": "message",
                    "data": { "uid": uid, "body": body, "attach": { "mime": "", "data": "" } } });
                if let Err(e) = write_half.write_all(request.to_string().as_bytes()).await {
                    eprintln!("Send failed: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }
}
