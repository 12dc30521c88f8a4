#![allow(dead_code)]

pub mod specs {
    /// Petstore subset used by the API-mode scenarios.
    pub const PETSTORE: &str = r##"
openapi: 3.0.1
info: {title: petstore, version: "1.0.0"}
paths:
  /pet:
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema: {$ref: "#/components/schemas/Pet"}
      responses: {"200": {description: ok}}
  /pet/findByStatus:
    get:
      parameters:
        - name: status
          in: query
          required: true
          schema: {type: string, enum: [available, pending, sold]}
      responses: {"200": {description: ok}}
  /pet/findByIds:
    get:
      parameters:
        - name: ids
          in: query
          required: true
          explode: false
          schema: {type: array, items: {type: integer}}
      responses: {"200": {description: ok}}
  /category:
    get:
      parameters:
        - {name: category, in: query, schema: {type: string}}
      responses: {"200": {description: ok}}
components:
  schemas:
    Pet:
      type: object
      required: [name, photoUrls]
      properties:
        id: {type: integer}
        name: {type: string}
        photoUrls: {type: array, items: {type: string}}
"##;

    /// Catalog state before a reload: only `GET /`.
    pub const ROOT_ONLY: &str = r#"
openapi: 3.0.1
info: {title: store-a, version: "1"}
paths:
  /:
    get:
      responses: {"200": {description: ok}}
"#;

    /// Catalog state after a reload: `GET /` and `GET /test/new`.
    pub const ROOT_AND_NEW: &str = r#"
openapi: 3.0.1
info: {title: store-b, version: "2"}
paths:
  /:
    get:
      responses: {"200": {description: ok}}
  /test/new:
    get:
      responses: {"200": {description: ok}}
"#;
}

pub mod temp_files {
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Scratch directory removed when dropped.
    pub struct Scratch {
        dir: TempDir,
    }

    impl Scratch {
        pub fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        pub fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        pub fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.path(name);
            std::fs::write(&path, content).unwrap();
            path
        }
    }
}

pub mod catalog_db {
    use rusqlite::{params, Connection};
    use std::path::{Path, PathBuf};

    /// Writable handle on an `openapi_schemas` test database.
    pub struct CatalogDb {
        path: PathBuf,
        with_status: bool,
    }

    impl CatalogDb {
        /// v1 layout: no `status` column.
        pub fn v1(path: impl AsRef<Path>) -> Self {
            Self::create(path.as_ref(), false)
        }

        /// v2 layout: v1 plus `status`.
        pub fn v2(path: impl AsRef<Path>) -> Self {
            Self::create(path.as_ref(), true)
        }

        fn create(path: &Path, with_status: bool) -> Self {
            let conn = Connection::open(path).unwrap();
            let status = if with_status { ", status TEXT" } else { "" };
            conn.execute_batch(&format!(
                "CREATE TABLE openapi_schemas (
                    schema_id INTEGER,
                    schema_version TEXT,
                    schema_format TEXT,
                    schema_content TEXT{status}
                );"
            ))
            .unwrap();
            Self {
                path: path.to_path_buf(),
                with_status,
            }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        pub fn insert(&self, schema_id: i64, version: &str, format: &str, content: &str, status: &str) {
            let conn = Connection::open(&self.path).unwrap();
            if self.with_status {
                conn.execute(
                    "INSERT INTO openapi_schemas VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![schema_id, version, format, content, status],
                )
                .unwrap();
            } else {
                conn.execute(
                    "INSERT INTO openapi_schemas VALUES (?1, ?2, ?3, ?4)",
                    params![schema_id, version, format, content],
                )
                .unwrap();
            }
        }

        /// Replace a schema's content and version, flagging it `new`.
        pub fn replace(&self, schema_id: i64, version: &str, content: &str) {
            let conn = Connection::open(&self.path).unwrap();
            let sql = if self.with_status {
                "UPDATE openapi_schemas SET schema_version = ?2, schema_content = ?3, status = 'new' WHERE schema_id = ?1"
            } else {
                "UPDATE openapi_schemas SET schema_version = ?2, schema_content = ?3 WHERE schema_id = ?1"
            };
            conn.execute(sql, params![schema_id, version, content]).unwrap();
        }

        pub fn statuses(&self) -> Vec<(i64, String)> {
            let conn = Connection::open(&self.path).unwrap();
            let mut stmt = conn
                .prepare("SELECT schema_id, status FROM openapi_schemas ORDER BY schema_id")
                .unwrap();
            let rows = stmt
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
                .unwrap();
            rows.map(Result::unwrap).collect()
        }
    }
}

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// A loopback address nothing is listening on yet.
    pub fn free_addr() -> std::net::SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw HTTP/1.1 request and read until the peer closes or the
    /// read times out.
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if response_complete(&buf) {
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {e:?}"),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn response_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    /// Status code and body of a raw response.
    pub fn parse_response(resp: &str) -> (u16, String) {
        let mut parts = resp.splitn(2, "\r\n\r\n");
        let head = parts.next().unwrap_or("");
        let body = parts.next().unwrap_or("").to_string();
        let status = head
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        (status, body)
    }

    /// `GET`-style request with the schema selector header.
    pub fn request(method: &str, target: &str, schema_ids: Option<&str>, extra: &[(&str, &str)], body: &str) -> String {
        let mut req = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n");
        if let Some(ids) = schema_ids {
            req.push_str(&format!("X-Wallarm-Schema-ID: {ids}\r\n"));
        }
        for (k, v) in extra {
            req.push_str(&format!("{k}: {v}\r\n"));
        }
        req.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
        req
    }
}
