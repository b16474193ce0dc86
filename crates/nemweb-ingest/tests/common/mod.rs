//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use nemweb_ingest::http::{HttpError, HttpResponse, HttpTransport};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const BASE_URL: &str = "http://nemweb.test/Reports/Current/Dispatch_SCADA/";

/// A complete single-interval DISPATCHSCADA file
pub fn scada_csv(interval: &str, units: &[(&str, &str)]) -> String {
    let mut csv = String::from(
        "C,NEMP.WORLD,DISPATCHSCADA,AEMO,PUBLIC,2022/06/13,00:25:14,0000000365048508,DISPATCHSCADA,0000000365048502\n\
         I,DISPATCH,UNIT_SCADA,1,SETTLEMENTDATE,DUID,SCADAVALUE\n",
    );
    for (duid, value) in units {
        csv.push_str(&format!("D,DISPATCH,UNIT_SCADA,1,\"{interval}\",{duid},{value}\n"));
    }
    csv.push_str(&format!("C,\"END OF REPORT\",{}\n", units.len() + 3));
    csv
}

/// Zip `entries` in order
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// An IIS-style listing row
pub fn iis_row(modified: &str, size: u64, href: &str, name: &str) -> String {
    format!("{modified}        {size} <A HREF=\"{href}\">{name}</A><br>")
}

/// Wrap rows in an IIS listing page
pub fn iis_page(rows: &[String]) -> String {
    format!(
        "<html><head><title>nemweb.com.au - /Reports/Current/Dispatch_SCADA/</title></head><body>\
         <H1>nemweb.com.au - /Reports/Current/Dispatch_SCADA/</H1><hr>\
         <pre><A HREF=\"/Reports/Current/\">[To Parent Directory]</A><br><br>{}</pre><hr></body></html>",
        rows.join("")
    )
}

enum Scripted {
    Body(Vec<u8>),
    Status(u16),
}

/// In-process transport serving canned responses
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Scripted>>,
    delay: Option<Duration>,
    requests: AtomicUsize,
    downloads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serve(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Body(body.into()));
        self
    }

    pub fn fail(self, url: &str, status: u16) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Status(status));
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.routes.lock().unwrap().get(url) {
            Some(Scripted::Body(body)) => Ok(HttpResponse {
                status: 200,
                body: body.clone(),
            }),
            Some(Scripted::Status(status)) => Err(HttpError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(HttpError::Status {
                url: url.to_string(),
                status: 404,
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.respond(url).await
    }

    async fn download_to(&self, url: &str, dest: &std::path::Path) -> Result<u64, HttpError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let response = self.respond(url).await?;
        tokio::fs::write(dest, &response.body).await?;
        Ok(response.body.len() as u64)
    }
}
