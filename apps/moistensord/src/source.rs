use std::io::Read;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Blocking serial reader on a dedicated thread (serialport I/O is
/// synchronous), bridged into the async side through the line channel.
/// Bytes are accumulated until a newline; carriage returns and empty lines
/// are discarded before forwarding.
pub fn spawn_serial_reader(path: String, baud: u32, tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let mut port = match serialport::new(&path, baud)
            .timeout(Duration::from_secs(10))
            .open()
        {
            Ok(port) => {
                info!(port = %path, baud, "serial port opened");
                port
            }
            Err(e) => {
                error!(port = %path, error = %e, "serial port could not be opened");
                return;
            }
        };

        let mut buf = [0u8; 256];
        let mut acc: Vec<u8> = Vec::with_capacity(256);
        loop {
            match port.read(&mut buf) {
                Ok(n) if n > 0 => {
                    acc.extend_from_slice(&buf[..n]);
                    while let Some(pos) = acc.iter().position(|&b| b == b'\n') {
                        let raw: Vec<u8> = acc.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&raw).trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if tx.blocking_send(line).is_err() {
                            // Ingestion side shut down.
                            return;
                        }
                    }
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    error!(error = %e, "serial read failed");
                    return;
                }
            }
        }
    });
}

/// Synthetic node #9 for running the full pipeline without hardware: one
/// calibration frame, then a sine-wave measurement every interval.
pub fn spawn_debug_source(interval_secs: u64, tx: mpsc::Sender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs.max(1));
        tokio::time::sleep(interval).await;
        let calibration =
            format!("[D9PRv1-2] v? t0m vn? vx? cd350 cw200 idx0 int{interval_secs} f1");
        if tx.send(calibration).await.is_err() {
            return;
        }
        let start = Instant::now();
        loop {
            tokio::time::sleep(interval).await;
            let elapsed = start.elapsed().as_secs_f64();
            let moisture = 150.0 * (0.5 * (0.03 * elapsed).sin() + 0.5) + 200.0;
            let line = format!(
                "[D9PRv1-1] v? t{uptime}m m{moisture}",
                uptime = (elapsed / 60.0) as u64,
                moisture = moisture as u64
            );
            if tx.send(line).await.is_err() {
                return;
            }
        }
    })
}
