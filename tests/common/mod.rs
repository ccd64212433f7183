//! Shared fixtures: scripted transports, an in-memory bulk archive and a
//! core assembled around them.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sukl_registry::domain::matcher::FuzzyMatcher;
use sukl_registry::domain::traits::{RemoteReply, RemoteRequest, RemoteTransport, TransportError};
use sukl_registry::infrastructure::config::Config;
use sukl_registry::infrastructure::storage::dataset::{ArchiveSource, BulkDataset};
use sukl_registry::infrastructure::storage::zip_guard::ZipGuard;
use sukl_registry::AppState;
use zip::write::SimpleFileOptions;

pub type Reply = Result<RemoteReply, TransportError>;

pub fn json(status: u16, body: &str) -> Reply {
    Ok(RemoteReply {
        status,
        body: body.as_bytes().to_vec(),
    })
}

pub fn refused() -> Reply {
    Err(TransportError::Connect("connection refused".to_string()))
}

/// Answers every request through a routing function and counts calls.
pub struct ScriptedTransport {
    route: Box<dyn Fn(&RemoteRequest) -> Reply + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(route: impl Fn(&RemoteRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            route: Box::new(route),
            calls: AtomicUsize::new(0),
        })
    }

    /// Transport of a service that is down.
    pub fn down() -> Arc<Self> {
        Self::new(|_| refused())
    }

    /// A healthy registry serving the given search codes and details.
    pub fn registry(search: Vec<&str>, details: HashMap<String, String>) -> Arc<Self> {
        let search_body = serde_json::to_string(&search).unwrap_or_default();
        Self::new(move |request| {
            let path = request.path.trim_end_matches('/');
            if path == "/dlp/v1/lecive-pripravky" {
                return json(200, &search_body);
            }
            let code = path.rsplit('/').next().unwrap_or_default();
            match details.get(code) {
                Some(body) => json(200, body),
                None => json(404, r#"{"kodChyby":404,"popisChyby":"Nenalezeno"}"#),
            }
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn get(&self, request: &RemoteRequest) -> Result<RemoteReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.route)(request)
    }
}

pub fn detail_json(code: &str, name: &str, atc: &str, available: bool) -> String {
    serde_json::json!({
        "kodSUKL": code,
        "nazev": name,
        "sila": "400MG",
        "lekovaFormaKod": "TBL FLM",
        "ATCkod": atc,
        "stavRegistraceKod": "R",
        "zpusobVydejeKod": "F",
        "registracniCislo": "29/ 123/91-C",
        "jeDodavka": available,
    })
    .to_string()
}

/// Builds a zip of windows-1250 encoded CSV members.
#[derive(Default)]
pub struct ArchiveBuilder {
    members: Vec<(String, String)>,
}

impl ArchiveBuilder {
    pub fn member(mut self, name: &str, text: &str) -> Self {
        self.members.push((name.to_string(), text.to_string()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, text) in &self.members {
            writer
                .start_file(name.as_str(), SimpleFileOptions::default())
                .unwrap();
            let (encoded, _, _) = encoding_rs::WINDOWS_1250.encode(text);
            writer.write_all(&encoded).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

pub const REGISTRY: &str = "\
KOD_SUKL;NAZEV;SILA;FORMA;BALENI;DOPLNEK;ATC_WHO;REG;VYDEJ;DODAVKY;CESTA;DRZ;RC
0012345;NUROFEN;400MG;TBL FLM;24;;M01AE01;R;F;A;POR;RB;07/ 123/91-C
0000101;IBUPROFEN AL;400MG;TBL FLM;30;;M01AE01;R;F;A;POR;AL;
0000102;IBALGIN;400MG;TBL FLM;24;;M01AE01;R;F;N;POR;ZE;
0000103;BRUFEN;400MG;TBL FLM;30;;M01AE01;R;R;A;POR;MY;
0000104;MODAFEN;200MG;TBL FLM;12;;M01AE51;R;F;A;POR;ZE;
0000201;PARALEN;500MG;TBL NOB;24;;N02BE01;R;F;A;POR;ZE;
0000202;PANADOL;500MG;TBL FLM;12;;N02BE01;R;F;N;POR;GS;
";

pub const COMPOSITION: &str = "\
KOD_SUKL;KOD_LATKY;AMNT;UN
0012345;1;400;MG
0000101;1;400;MG
0000102;1;400;MG
0000103;1;400;MG
0000104;1;200;MG
0000104;3;30;MG
0000201;2;500;MG
0000202;2;500;MG
";

pub const SUBSTANCES: &str = "\
KOD_LATKY;NAZEV_INN;NAZEV_EN;NAZEV
1;IBUPROFEN;IBUPROFEN;IBUPROFEN
2;PARACETAMOL;PARACETAMOL;PARACETAMOL
3;PSEUDOEFEDRIN;PSEUDOEPHEDRINE;PSEUDOEFEDRIN
";

pub const ATC: &str = "\
ATC;NAZEV;NAZEV_EN
M;Svalová a kosterní soustava;Musculo-skeletal system
M01;Antiflogistika a antirevmatika;Antiinflammatory products
M01A;Nesteroidní antiflogistika;Non-steroids
M01AE;Deriváty kyseliny propionové;Propionic acid derivatives
M01AE01;Ibuprofen;Ibuprofen
M01AE51;Ibuprofen, kombinace;Ibuprofen, combinations
N02BE01;Paracetamol;Paracetamol
";

pub const PRICES: &str = "\
KOD_SUKL;MAX_CENA_VYROBCE;MAX_CENA_LEKARNA;UHRADA;DOPLATEK;UHRADOVA_SKUPINA;INDIKACNI_OMEZENI;PRESKRIPCNI_OMEZENI;SPECIALISTA
0012345;58,20;89,90;45,10;44,80;12;;;N
0000101;50,00;75,00;0;75,00;;;;N
";

pub const PHARMACIES: &str = "\
ID_LEKARNY;NAZEV;ULICE;MESTO;PSC;OKRES;KRAJ;TELEFON;EMAIL;WEB;LAT;LON;PROVOZOVATEL;NEPRETRZITY_PROVOZ;INTERNETOVY_PRODEJ;PRIPRAVNA;AKTIVNI
1;Lékárna U Anděla;Nádražní 1;Praha;150 00;Praha;Praha;;;;50,07;14,40;;A;N;A;A
2;Lékárna Centrum;Masarykova 2;Brno;602 00;Brno-město;Jihomoravský;;;;49,19;16,61;;N;A;N;A
3;Zavřená lékárna;Dlouhá 3;Praha;110 00;Praha;Praha;;;;;;;A;A;N;N
";

pub const DOCUMENTS: &str = "\
KOD_SUKL;PIL;SPC
0012345;PI123.pdf;SPC123.pdf
";

pub fn sample_archive() -> Vec<u8> {
    ArchiveBuilder::default()
        .member("dlp_lecivepripravky.csv", REGISTRY)
        .member("dlp_slozeni.csv", COMPOSITION)
        .member("dlp_lecivelatky.csv", SUBSTANCES)
        .member("dlp_atc.csv", ATC)
        .member("dlp_cau.csv", PRICES)
        .member("lekarny_seznam.csv", PHARMACIES)
        .member("dlp_nazvydokumentu.csv", DOCUMENTS)
        .build()
}

/// Defaults with a fast retry schedule.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.remote.retry_base_delay_ms = 1;
    config.remote.retry_jitter = 0.0;
    config
}

pub fn core_with(
    config: Config,
    transport: Arc<ScriptedTransport>,
    archive: Vec<u8>,
    size_cap: u64,
) -> AppState {
    let dataset = BulkDataset::new(
        ArchiveSource::Bytes(Arc::new(archive)),
        ZipGuard::new(size_cap),
        b';',
        reqwest::Client::new(),
        FuzzyMatcher::default(),
    );
    AppState::with_parts(config, transport, dataset).unwrap()
}

pub fn core(transport: Arc<ScriptedTransport>) -> AppState {
    core_with(test_config(), transport, sample_archive(), 64 * 1024 * 1024)
}
