// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTPS HEC endpoint serving a freshly generated self-signed certificate

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rcgen::CertifiedKey;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::{crypto::ring, ServerConfig};
use tokio_rustls::TlsAcceptor;

#[derive(Clone)]
pub struct TlsServer {
    pub addr: SocketAddr,
    bodies: Arc<Mutex<Vec<String>>>,
    failed_handshakes: Arc<AtomicUsize>,
}

impl TlsServer {
    /// Start an HTTPS server on a random port
    pub async fn start() -> Self {
        let CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
                .expect("Failed to generate certificate");
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("Failed to select protocol versions")
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key)
            .expect("Failed to load certificate");
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind TLS server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let bodies = Arc::new(Mutex::new(Vec::new()));
        let failed_handshakes = Arc::new(AtomicUsize::new(0));
        let server = TlsServer {
            addr,
            bodies: bodies.clone(),
            failed_handshakes: failed_handshakes.clone(),
        };

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let acceptor = acceptor.clone();
                let bodies = bodies.clone();
                let failed_handshakes = failed_handshakes.clone();

                tokio::spawn(async move {
                    let tls = match acceptor.accept(stream).await {
                        Ok(tls) => tls,
                        Err(_) => {
                            failed_handshakes.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                    };

                    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let bodies = bodies.clone();
                        async move {
                            let body = req
                                .into_body()
                                .collect()
                                .await
                                .map(|collected| collected.to_bytes().to_vec())
                                .unwrap_or_default();
                            bodies
                                .lock()
                                .unwrap()
                                .push(String::from_utf8_lossy(&body).into_owned());

                            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(
                                br#"{"text":"Success","code":0}"#,
                            ))))
                        }
                    });

                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(tls), service)
                        .await;
                });
            }
        });

        server
    }

    pub fn url(&self) -> String {
        format!("https://{}/services/collector", self.addr)
    }

    /// Request bodies received over completed handshakes
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    /// Connections the client abandoned during the handshake
    pub fn failed_handshakes(&self) -> usize {
        self.failed_handshakes.load(Ordering::SeqCst)
    }
}
