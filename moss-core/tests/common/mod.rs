//! Shared fixtures: a scripted submission-protocol server and a static HTTP
//! server, both bound to loopback. No test touches the real network.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// What the protocol server answers at the terminal query
#[derive(Clone)]
pub enum QueryReply {
    /// A result URL line
    Url(String),
    /// An arbitrary line, e.g. `Error: ...` or garbage
    Line(String),
    /// A bare newline
    Empty,
    /// Drop the connection without answering
    CloseSilently,
}

/// Minimal scripted implementation of the submission protocol
pub struct MossServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    lines: Arc<Mutex<Vec<String>>>,
}

impl MossServer {
    pub async fn spawn(reply: QueryReply) -> Self {
        Self::spawn_with(reply, "yes").await
    }

    /// `language_ack` is the server's answer to the `language` command
    pub async fn spawn_with(reply: QueryReply, language_ack: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let lines = Arc::new(Mutex::new(Vec::new()));

        {
            let connections = connections.clone();
            let lines = lines.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    connections.fetch_add(1, Ordering::SeqCst);
                    let reply = reply.clone();
                    let lines = lines.clone();
                    tokio::spawn(async move {
                        let _ = handle_protocol(stream, reply, language_ack, lines).await;
                    });
                }
            });
        }

        Self {
            addr,
            connections,
            lines,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn received_lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn lines_starting_with(&self, prefix: &str) -> usize {
        self.received_lines()
            .iter()
            .filter(|l| l.starts_with(prefix))
            .count()
    }
}

async fn handle_protocol(
    stream: TcpStream,
    reply: QueryReply,
    language_ack: &str,
    lines: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        lines.lock().unwrap().push(line.clone());

        if let Some(rest) = line.strip_prefix("file ") {
            // file <id> <lang> <size> <name>: consume exactly <size> raw bytes
            let size: usize = rest
                .split_whitespace()
                .nth(2)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let mut payload = vec![0u8; size];
            reader.read_exact(&mut payload).await?;
        } else if line.starts_with("language ") {
            write_half
                .write_all(format!("{language_ack}\n").as_bytes())
                .await?;
        } else if line.starts_with("query ") {
            match &reply {
                QueryReply::Url(url) => {
                    write_half.write_all(format!("{url}\n").as_bytes()).await?
                }
                QueryReply::Line(text) => {
                    write_half.write_all(format!("{text}\n").as_bytes()).await?
                }
                QueryReply::Empty => write_half.write_all(b"\n").await?,
                QueryReply::CloseSilently => return Ok(()),
            }
        } else if line == "end" {
            return Ok(());
        }
    }
}

/// Response for one HTTP route
#[derive(Clone)]
pub enum HttpReply {
    Ok(String),
    Status(u16, String),
    /// Close the connection before sending any response
    CloseAbruptly,
}

/// Static HTTP/1.1 server, one request per connection
pub struct HttpServer {
    pub addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
}

impl HttpServer {
    pub async fn spawn(routes: HashMap<String, HttpReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        {
            let hits = hits.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let hits = hits.clone();
                    let routes = routes.clone();
                    tokio::spawn(async move {
                        let _ = handle_http(stream, routes, hits).await;
                    });
                }
            });
        }

        Self { addr, hits }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.addr.port())
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hits_containing(&self, needle: &str) -> usize {
        self.requested_paths()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

async fn handle_http(
    stream: TcpStream,
    routes: Arc<HashMap<String, HttpReply>>,
    hits: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);

    let mut request_line = String::new();
    if stream.read_line(&mut request_line).await? == 0 {
        return Ok(());
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    // drain request headers
    loop {
        let mut header = String::new();
        if stream.read_line(&mut header).await? == 0 {
            break;
        }
        if header == "\r\n" || header == "\n" {
            break;
        }
    }

    hits.lock().unwrap().push(path.clone());

    let (status, body) = match routes.get(&path) {
        Some(HttpReply::Ok(body)) => (200, body.clone()),
        Some(HttpReply::Status(code, body)) => (*code, body.clone()),
        Some(HttpReply::CloseAbruptly) | None => return Ok(()),
    };

    let reason = if status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// A report index page with the given number of table rows (matches = rows - 1)
pub fn index_html(rows: usize) -> String {
    let mut html = String::from("<HTML><HEAD><TITLE>Results</TITLE></HEAD><BODY><TABLE>\n");
    html.push_str("<TR><TH>File 1<TH>File 2<TH>Lines Matched\n");
    for i in 1..rows {
        html.push_str(&format!("<TR><TD>a{i}.py<TD>b{i}.py<TD>{i}\n"));
    }
    html.push_str("</TABLE></BODY></HTML>\n");
    html
}

/// A parseable match fragment with names derived from the match index
pub fn match_html(index: usize) -> String {
    format!(
        r#"<HTML><BODY>
<TABLE>
<TR><TH>alice{index}.py ({}%)<TH><IMG SRC="bar.gif"><TH>bob{index}.py ({}%)<TH><IMG SRC="bar.gif"><TH>
<TR><TD><A HREF="m.html">1-3</A><TD><TD><A HREF="m.html">10-11</A><TD>
</TABLE>
</BODY></HTML>
"#,
        50 + index,
        40 + index
    )
}
