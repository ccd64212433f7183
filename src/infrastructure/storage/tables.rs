// Row schemas of the bulk archive and their decoding
use crate::domain::error::RegistryError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

pub const REGISTRY_FILE: &str = "dlp_lecivepripravky.csv";
pub const COMPOSITION_FILE: &str = "dlp_slozeni.csv";
pub const SUBSTANCES_FILE: &str = "dlp_lecivelatky.csv";
pub const ATC_FILE: &str = "dlp_atc.csv";
pub const DOCUMENTS_FILE: &str = "dlp_nazvydokumentu.csv";
pub const PHARMACIES_FILE: &str = "lekarny_seznam.csv";
pub const REIMBURSEMENT_FILE: &str = "dlp_cau.csv";

pub const REQUIRED_FILES: [&str; 4] = [REGISTRY_FILE, COMPOSITION_FILE, SUBSTANCES_FILE, ATC_FILE];
pub const OPTIONAL_FILES: [&str; 3] = [DOCUMENTS_FILE, PHARMACIES_FILE, REIMBURSEMENT_FILE];

pub fn all_files() -> Vec<&'static str> {
    REQUIRED_FILES.iter().chain(OPTIONAL_FILES.iter()).copied().collect()
}

#[derive(Debug, Deserialize)]
pub struct MedicineRow {
    #[serde(rename = "KOD_SUKL")]
    pub code: String,
    #[serde(rename = "NAZEV")]
    pub name: String,
    #[serde(rename = "SILA", default)]
    pub strength: Option<String>,
    #[serde(rename = "FORMA", default)]
    pub form: Option<String>,
    #[serde(rename = "BALENI", default)]
    pub package: Option<String>,
    #[serde(rename = "DOPLNEK", default)]
    pub supplement: Option<String>,
    #[serde(rename = "ATC_WHO", default)]
    pub atc: Option<String>,
    #[serde(rename = "REG", default)]
    pub registration_status: Option<String>,
    #[serde(rename = "VYDEJ", default)]
    pub dispensing_mode: Option<String>,
    #[serde(rename = "DODAVKY", default)]
    pub deliveries: Option<String>,
    #[serde(rename = "CESTA", default)]
    pub route: Option<String>,
    #[serde(rename = "DRZ", default)]
    pub holder: Option<String>,
    #[serde(rename = "RC", default)]
    pub registration_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompositionRow {
    #[serde(rename = "KOD_SUKL")]
    pub code: String,
    #[serde(rename = "KOD_LATKY")]
    pub substance_id: String,
    #[serde(rename = "AMNT", default)]
    pub amount: Option<String>,
    #[serde(rename = "UN", default)]
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubstanceRow {
    #[serde(rename = "KOD_LATKY")]
    pub id: String,
    #[serde(rename = "NAZEV_INN", default)]
    pub name_inn: Option<String>,
    #[serde(rename = "NAZEV_EN", default)]
    pub name_en: Option<String>,
    #[serde(rename = "NAZEV", default)]
    pub name_cz: Option<String>,
}

impl SubstanceRow {
    /// Display name: INN, else Czech, else English.
    pub fn display_name(&self) -> Option<&str> {
        self.name_inn
            .as_deref()
            .or(self.name_cz.as_deref())
            .or(self.name_en.as_deref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        [&self.name_inn, &self.name_cz, &self.name_en]
            .into_iter()
            .filter_map(|n| n.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct AtcRow {
    #[serde(rename = "ATC")]
    pub code: String,
    #[serde(rename = "NAZEV")]
    pub name: String,
    #[serde(rename = "NAZEV_EN", default)]
    pub name_en: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRow {
    #[serde(rename = "KOD_SUKL")]
    pub code: String,
    #[serde(rename = "PIL", default)]
    pub pil: Option<String>,
    #[serde(rename = "SPC", default)]
    pub spc: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PharmacyRow {
    #[serde(rename = "ID_LEKARNY")]
    pub id: String,
    #[serde(rename = "NAZEV")]
    pub name: String,
    #[serde(rename = "ULICE", default)]
    pub street: Option<String>,
    #[serde(rename = "MESTO")]
    pub city: String,
    #[serde(rename = "PSC", default)]
    pub postal_code: Option<String>,
    #[serde(rename = "OKRES", default)]
    pub district: Option<String>,
    #[serde(rename = "KRAJ", default)]
    pub region: Option<String>,
    #[serde(rename = "TELEFON", default)]
    pub phone: Option<String>,
    #[serde(rename = "EMAIL", default)]
    pub email: Option<String>,
    #[serde(rename = "WEB", default)]
    pub web: Option<String>,
    #[serde(rename = "LAT", default)]
    pub latitude: Option<String>,
    #[serde(rename = "LON", default)]
    pub longitude: Option<String>,
    #[serde(rename = "PROVOZOVATEL", default)]
    pub operator: Option<String>,
    #[serde(rename = "NEPRETRZITY_PROVOZ", default)]
    pub nonstop: Option<String>,
    #[serde(rename = "INTERNETOVY_PRODEJ", default)]
    pub online_sales: Option<String>,
    #[serde(rename = "PRIPRAVNA", default)]
    pub preparation_lab: Option<String>,
    #[serde(rename = "AKTIVNI", default)]
    pub active: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReimbursementRow {
    #[serde(rename = "KOD_SUKL")]
    pub code: String,
    #[serde(rename = "MAX_CENA_VYROBCE", default)]
    pub max_producer_price: Option<String>,
    #[serde(rename = "MAX_CENA_LEKARNA", default)]
    pub max_retail_price: Option<String>,
    #[serde(rename = "UHRADA", default)]
    pub reimbursement: Option<String>,
    #[serde(rename = "DOPLATEK", default)]
    pub copay: Option<String>,
    #[serde(rename = "UHRADOVA_SKUPINA", default)]
    pub group: Option<String>,
    #[serde(rename = "INDIKACNI_OMEZENI", default)]
    pub indication_limit: Option<String>,
    #[serde(rename = "PRESKRIPCNI_OMEZENI", default)]
    pub prescription_limit: Option<String>,
    #[serde(rename = "SPECIALISTA", default)]
    pub specialist: Option<String>,
}

/// Every table of one archive, decoded but not yet indexed.
#[derive(Debug, Default)]
pub struct RawTables {
    pub medicines: Vec<MedicineRow>,
    pub compositions: Vec<CompositionRow>,
    pub substances: Vec<SubstanceRow>,
    pub atc: Vec<AtcRow>,
    pub documents: Vec<DocumentRow>,
    pub pharmacies: Vec<PharmacyRow>,
    pub reimbursements: Vec<ReimbursementRow>,
    pub skipped_rows: usize,
}

impl RawTables {
    /// Parses the extracted members; required members must be present.
    pub fn parse(files: &HashMap<String, Vec<u8>>, delimiter: u8) -> Result<Self, RegistryError> {
        for name in REQUIRED_FILES {
            if !files.contains_key(name) {
                return Err(RegistryError::Dataset(format!(
                    "archive is missing {}",
                    name
                )));
            }
        }
        for name in OPTIONAL_FILES {
            if !files.contains_key(name) {
                warn!("Archive has no {}, related queries will be empty", name);
            }
        }

        let mut tables = RawTables::default();
        tables.medicines = tables.table(files, REGISTRY_FILE, delimiter)?;
        tables.compositions = tables.table(files, COMPOSITION_FILE, delimiter)?;
        tables.substances = tables.table(files, SUBSTANCES_FILE, delimiter)?;
        tables.atc = tables.table(files, ATC_FILE, delimiter)?;
        tables.documents = tables.table(files, DOCUMENTS_FILE, delimiter)?;
        tables.pharmacies = tables.table(files, PHARMACIES_FILE, delimiter)?;
        tables.reimbursements = tables.table(files, REIMBURSEMENT_FILE, delimiter)?;
        Ok(tables)
    }

    fn table<T: DeserializeOwned>(
        &mut self,
        files: &HashMap<String, Vec<u8>>,
        name: &str,
        delimiter: u8,
    ) -> Result<Vec<T>, RegistryError> {
        match files.get(name) {
            Some(bytes) => {
                let (rows, skipped) = parse_rows(name, bytes, delimiter)?;
                self.skipped_rows += skipped;
                Ok(rows)
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Decodes legacy windows-1250 text. Undecodable bytes become U+FFFD.
pub fn decode_legacy(bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::WINDOWS_1250.decode(bytes);
    if had_errors {
        warn!("Replaced undecodable bytes while reading windows-1250 text");
    }
    text.into_owned()
}

/// Parses one delimited table with a header row. Malformed rows are skipped
/// and counted; a broken header fails the whole table.
pub fn parse_rows<T: DeserializeOwned>(
    name: &str,
    bytes: &[u8],
    delimiter: u8,
) -> Result<(Vec<T>, usize), RegistryError> {
    let text = decode_legacy(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    reader
        .headers()
        .map_err(|e| RegistryError::Dataset(format!("{}: unreadable header: {}", name, e)))?;

    let mut rows = Vec::new();
    let mut skipped = 0;
    for (line, record) in reader.deserialize::<T>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => {
                skipped += 1;
                if skipped <= 10 {
                    warn!("{}: skipping row {}: {}", name, line + 2, e);
                }
            }
        }
    }
    if skipped > 10 {
        warn!("{}: {} rows skipped in total", name, skipped);
    }
    Ok((rows, skipped))
}

/// Accepts `12,50` and `12.50`; blank means absent.
pub fn parse_decimal(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    value.replace(',', ".").parse::<f64>().ok()
}

pub fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("a" | "1" | "ano" | "y" | "yes" | "true")
    )
}

/// Empty strings are treated as missing.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
