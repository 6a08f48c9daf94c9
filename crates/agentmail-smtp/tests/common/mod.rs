//! Scripted single-connection SMTP server.
//!
//! Also compiled into the agentmail-core transport tests.

#![allow(dead_code)]

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Replies the fake server sends, one per command verb. An empty reply
/// means the server goes quiet and leaves the client waiting.
#[derive(Debug, Clone)]
pub struct Script {
    pub greeting: &'static str,
    pub ehlo: &'static str,
    pub helo: &'static str,
    pub mail: &'static str,
    pub rcpt: &'static str,
    pub data: &'static str,
    pub end_of_data: &'static str,
    pub quit: &'static str,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: "220 mx.test ESMTP ready\r\n",
            ehlo: "250-mx.test greets you\r\n250-SIZE 4096\r\n250 8BITMIME\r\n",
            helo: "250 mx.test\r\n",
            mail: "250 2.1.0 Ok\r\n",
            rcpt: "250 2.1.5 Ok\r\n",
            data: "354 End data with <CR><LF>.<CR><LF>\r\n",
            end_of_data: "250 2.0.0 Ok: queued\r\n",
            quit: "221 2.0.0 Bye\r\n",
        }
    }
}

/// Starts the server; the handle resolves to every line the client sent.
pub async fn serve(script: Script) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut transcript = Vec::new();
        let mut in_data = false;

        write.write_all(script.greeting.as_bytes()).await.unwrap();
        if script.greeting.is_empty() {
            // Nothing to answer before a greeting; wait for the client to leave.
            while let Ok(Some(_)) = lines.next_line().await {}
            return transcript;
        }

        while let Ok(Some(line)) = lines.next_line().await {
            transcript.push(line.clone());
            if in_data {
                if line == "." {
                    in_data = false;
                    write.write_all(script.end_of_data.as_bytes()).await.unwrap();
                }
                continue;
            }

            let verb = line.get(..4).unwrap_or_default().to_ascii_uppercase();
            let reply = match verb.as_str() {
                "EHLO" => script.ehlo,
                "HELO" => script.helo,
                "MAIL" => script.mail,
                "RCPT" => script.rcpt,
                "DATA" => {
                    in_data = script.data.starts_with("354");
                    script.data
                }
                "QUIT" => script.quit,
                _ => "500 5.5.2 unrecognized\r\n",
            };
            if reply.is_empty() {
                continue;
            }
            if write.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
            if verb == "QUIT" {
                break;
            }
        }
        transcript
    });

    (port, handle)
}
