//! Command-line front-end over `holdpty-core`. `start` runs the holder
//! itself (one process per session); the other subcommands are short-lived
//! registry/protocol clients.

use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;

use holdpty_core::{HolderError, Mode, StartOptions};

fn usage() -> ! {
    eprintln!(
        "usage:\n\
         \u{20}  holdpty start [--name NAME] [--cols N] [--rows N] [--cwd DIR] [--dir DIR] -- COMMAND...\n\
         \u{20}  holdpty list [--dir DIR]\n\
         \u{20}  holdpty rm NAME [--dir DIR]\n\
         \u{20}  holdpty attach NAME [--dir DIR]\n\
         \u{20}  holdpty view NAME [--dir DIR]\n\
         \u{20}  holdpty logs NAME [--dir DIR]"
    );
    std::process::exit(2);
}

fn take_dir_flag(args: &mut Vec<String>) -> Option<PathBuf> {
    if let Some(pos) = args.iter().position(|a| a == "--dir") {
        args.remove(pos);
        if pos < args.len() {
            return Some(PathBuf::from(args.remove(pos)));
        }
    }
    None
}

fn main() {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }
    let command = args.remove(0);

    let rt = tokio::runtime::Runtime::new().expect("failed to start the async runtime");
    let result = match command.as_str() {
        "start" => rt.block_on(run_start(args)),
        "list" => run_list(args),
        "rm" => run_rm(args),
        "attach" => rt.block_on(run_peer(args, Mode::Attach)),
        "view" => rt.block_on(run_peer(args, Mode::View)),
        "logs" => rt.block_on(run_peer(args, Mode::Logs)),
        _ => usage(),
    };

    if let Err(e) = result {
        eprintln!("holdpty: {e}");
        std::process::exit(1);
    }
}

async fn run_start(mut args: Vec<String>) -> Result<(), HolderError> {
    let dir = take_dir_flag(&mut args);
    let mut name = None;
    let mut cols = None;
    let mut rows = None;
    let mut cwd = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--name" => {
                args.remove(i);
                name = Some(args.remove(i));
            }
            "--cols" => {
                args.remove(i);
                cols = args.remove(i).parse().ok();
            }
            "--rows" => {
                args.remove(i);
                rows = args.remove(i).parse().ok();
            }
            "--cwd" => {
                args.remove(i);
                cwd = Some(args.remove(i));
            }
            "--" => {
                args.remove(i);
                break;
            }
            _ => break,
        }
    }

    if args.is_empty() {
        usage();
    }

    let holder = holdpty_core::start(StartOptions {
        command: args,
        name,
        cols,
        rows,
        cwd,
        env: None,
        dir,
        linger_ms: None,
    })
    .await?;

    eprintln!("holdpty: session {:?} started (pid {})", holder.name(), holder.pid());
    let code = holder.wait_for_exit().await.unwrap_or(0);
    eprintln!("holdpty: child exited with code {code}");
    holder.wait_for_shutdown().await;
    std::process::exit(code);
}

fn run_list(mut args: Vec<String>) -> Result<(), HolderError> {
    let dir = take_dir_flag(&mut args);
    let sessions = holdpty_core::list_sessions(dir.as_deref())?;
    for entry in sessions {
        println!(
            "{}\tpid={}\tchild_pid={}\t{}",
            entry.name,
            entry.metadata.pid,
            entry.metadata.child_pid,
            entry.metadata.command.join(" ")
        );
    }
    Ok(())
}

fn run_rm(mut args: Vec<String>) -> Result<(), HolderError> {
    let dir = take_dir_flag(&mut args);
    let Some(name) = args.into_iter().next() else {
        usage();
    };
    holdpty_core::remove_session(dir.as_deref(), &name)
}

async fn run_peer(mut args: Vec<String>, mode: Mode) -> Result<(), HolderError> {
    let dir = take_dir_flag(&mut args);
    let Some(name) = args.into_iter().next() else {
        usage();
    };

    let mut peer = holdpty_core::connect_peer(dir.as_deref(), &name, mode).await?;
    eprintln!(
        "holdpty: connected to {:?} ({}x{}, holder pid {})",
        peer.ack.name, peer.ack.cols, peer.ack.rows, peer.ack.pid
    );

    // Stdin is read on a blocking thread and funnelled through a channel so
    // the main loop can `select!` it alongside incoming frames without the
    // two directions needing separate halves of the connection.
    let stdin_rx = if mode == Mode::Attach && std::io::stdin().is_terminal() {
        Some(spawn_stdin_reader())
    } else {
        None
    };
    tokio::pin!(stdin_rx);

    loop {
        tokio::select! {
            biased;

            input = recv_stdin(stdin_rx.as_mut()), if stdin_rx.is_some() => {
                match input {
                    Some(bytes) => peer.send_data(&bytes).await.map_err(HolderError::Io)?,
                    None => stdin_rx.set(None),
                }
            }

            frame = peer.next_frame() => {
                let Some(frame) = frame.map_err(HolderError::Io)? else { break };
                match frame.opcode {
                    holdpty_protocol::OP_DATA_OUT => {
                        let _ = std::io::stdout().write_all(&frame.payload);
                        let _ = std::io::stdout().flush();
                    }
                    holdpty_protocol::OP_EXIT => {
                        if let Some(code) = holdpty_protocol::decode_exit_code(&frame.payload) {
                            eprintln!("holdpty: session exited with code {code}");
                        }
                        break;
                    }
                    holdpty_protocol::OP_ERROR => {
                        eprintln!("holdpty: {}", String::from_utf8_lossy(&frame.payload));
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn spawn_stdin_reader() -> tokio::sync::mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        let mut stdin = std::io::stdin();
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

async fn recv_stdin(
    rx: std::pin::Pin<&mut Option<tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>>>,
) -> Option<Vec<u8>> {
    match rx.get_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
