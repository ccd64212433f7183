// Immutable, indexed view of one bulk archive
use crate::domain::matcher::{normalize, Candidate, FuzzyMatcher};
use crate::domain::model::{
    Alternative, AtcGroup, DocumentRecord, MedicineRecord, PharmacyCriteria, PharmacyRecord,
    ReimbursementRecord, SearchFilters, SearchHit, SnapshotVersion, SuklCode,
};
use crate::infrastructure::storage::tables::{
    non_empty, parse_decimal, parse_flag, RawTables, SubstanceRow,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Children reported per ATC group; the total is reported separately.
pub const ATC_CHILDREN_SHOWN: usize = 20;

/// One ATC group with its subtree.
#[derive(Debug, Clone)]
pub struct AtcTree {
    pub group: AtcGroup,
    pub children: Vec<AtcGroup>,
    pub total_children: usize,
}

/// Built once, never mutated. Readers hold an `Arc<Snapshot>` for the
/// duration of an operation.
#[derive(Debug)]
pub struct Snapshot {
    version: SnapshotVersion,
    medicines: Vec<MedicineRecord>,
    search_fields: Vec<Vec<String>>,
    by_code: HashMap<SuklCode, usize>,
    by_substance: HashMap<String, Vec<usize>>,
    by_atc: BTreeMap<String, Vec<usize>>,
    atc_groups: BTreeMap<String, AtcGroup>,
    reimbursements: HashMap<SuklCode, ReimbursementRecord>,
    documents: HashMap<SuklCode, DocumentRecord>,
    pharmacies: Vec<PharmacyRecord>,
    by_city: HashMap<String, Vec<usize>>,
    by_postal: HashMap<String, Vec<usize>>,
}

fn postal_key(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

impl Snapshot {
    pub fn build(tables: RawTables, sequence: u64, fingerprint: String) -> Self {
        let mut skipped = tables.skipped_rows;

        let substances: HashMap<&str, &SubstanceRow> = tables
            .substances
            .iter()
            .map(|row| (row.id.as_str(), row))
            .collect();

        let mut composition: HashMap<String, Vec<&SubstanceRow>> = HashMap::new();
        for row in &tables.compositions {
            let Ok(code) = SuklCode::parse(&row.code) else {
                skipped += 1;
                continue;
            };
            match substances.get(row.substance_id.as_str()) {
                Some(substance) => composition
                    .entry(code.as_str().to_string())
                    .or_default()
                    .push(substance),
                None => debug!("Composition refers to unknown substance {}", row.substance_id),
            }
        }

        let mut reimbursements = HashMap::new();
        for row in tables.reimbursements {
            let Ok(code) = SuklCode::parse(&row.code) else {
                skipped += 1;
                continue;
            };
            reimbursements
                .entry(code.clone())
                .or_insert_with(|| ReimbursementRecord {
                    code,
                    max_producer_price: parse_decimal(row.max_producer_price.as_deref()),
                    max_retail_price: parse_decimal(row.max_retail_price.as_deref()),
                    reimbursement_amount: parse_decimal(row.reimbursement.as_deref()),
                    patient_copay: parse_decimal(row.copay.as_deref()),
                    reimbursement_group: non_empty(row.group),
                    indication_limit: non_empty(row.indication_limit),
                    prescription_limit: non_empty(row.prescription_limit),
                    specialist_only: parse_flag(row.specialist.as_deref()),
                });
        }

        let mut documents = HashMap::new();
        for row in tables.documents {
            let Ok(code) = SuklCode::parse(&row.code) else {
                skipped += 1;
                continue;
            };
            documents.entry(code).or_insert(DocumentRecord {
                pil: non_empty(row.pil),
                spc: non_empty(row.spc),
            });
        }

        let mut medicines = Vec::with_capacity(tables.medicines.len());
        let mut search_fields = Vec::with_capacity(tables.medicines.len());
        let mut by_code = HashMap::with_capacity(tables.medicines.len());
        let mut by_substance: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_atc: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut duplicates = 0usize;

        for row in tables.medicines {
            let code = match SuklCode::parse(&row.code) {
                Ok(code) => code,
                Err(e) => {
                    warn!("Skipping registry row: {}", e);
                    skipped += 1;
                    continue;
                }
            };
            if by_code.contains_key(&code) {
                duplicates += 1;
                continue;
            }
            let index = medicines.len();
            let parts = composition.get(code.as_str()).map(Vec::as_slice).unwrap_or(&[]);

            let mut fields = vec![normalize(&row.name)];
            let mut names = Vec::new();
            for substance in parts {
                if let Some(display) = substance.display_name() {
                    if !names.iter().any(|n: &String| n == display) {
                        names.push(display.to_string());
                    }
                }
                for name in substance.names() {
                    let key = normalize(name);
                    if key.is_empty() {
                        continue;
                    }
                    let slots = by_substance.entry(key.clone()).or_default();
                    if slots.last() != Some(&index) {
                        slots.push(index);
                    }
                    if !fields.contains(&key) {
                        fields.push(key);
                    }
                }
            }

            let atc_code = non_empty(row.atc).map(|a| a.to_uppercase());
            if let Some(atc) = &atc_code {
                by_atc.entry(atc.clone()).or_default().push(index);
                fields.push(normalize(atc));
            }

            let pricing = reimbursements.get(&code).map(ReimbursementRecord::pricing);
            let docs = documents.get(&code).cloned();
            by_code.insert(code.clone(), index);
            search_fields.push(fields);
            medicines.push(MedicineRecord {
                code,
                name: row.name,
                strength: non_empty(row.strength),
                form_code: non_empty(row.form),
                package: non_empty(row.package),
                supplement: non_empty(row.supplement),
                atc_code,
                registration_status: non_empty(row.registration_status),
                registration_number: non_empty(row.registration_number),
                dispensing_mode: non_empty(row.dispensing_mode),
                route: non_empty(row.route),
                holder: non_empty(row.holder),
                is_available: parse_flag(row.deliveries.as_deref()),
                substances: names,
                pricing,
                documents: docs,
            });
        }
        if duplicates > 0 {
            warn!("{} duplicate registry codes ignored, first row kept", duplicates);
            skipped += duplicates;
        }

        let atc_groups: BTreeMap<String, AtcGroup> = tables
            .atc
            .into_iter()
            .filter(|row| !row.code.is_empty())
            .map(|row| {
                let code = row.code.to_uppercase();
                let group = AtcGroup {
                    level: AtcGroup::level_for(&code),
                    code: code.clone(),
                    name: row.name,
                    name_en: non_empty(row.name_en),
                };
                (code, group)
            })
            .collect();

        let mut pharmacies = Vec::with_capacity(tables.pharmacies.len());
        let mut by_city: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_postal: HashMap<String, Vec<usize>> = HashMap::new();
        for row in tables.pharmacies {
            let index = pharmacies.len();
            by_city.entry(normalize(&row.city)).or_default().push(index);
            let postal_code = non_empty(row.postal_code);
            if let Some(psc) = &postal_code {
                by_postal.entry(postal_key(psc)).or_default().push(index);
            }
            pharmacies.push(PharmacyRecord {
                id: row.id,
                name: row.name,
                street: non_empty(row.street),
                city: row.city,
                postal_code,
                district: non_empty(row.district),
                region: non_empty(row.region),
                phone: non_empty(row.phone),
                email: non_empty(row.email),
                web: non_empty(row.web),
                latitude: parse_decimal(row.latitude.as_deref()),
                longitude: parse_decimal(row.longitude.as_deref()),
                operator: non_empty(row.operator),
                has_24h_service: parse_flag(row.nonstop.as_deref()),
                has_internet_sales: parse_flag(row.online_sales.as_deref()),
                has_preparation_lab: parse_flag(row.preparation_lab.as_deref()),
                // a missing column means the register lists active ones only
                is_active: row.active.as_deref().map_or(true, |v| parse_flag(Some(v))),
            });
        }

        let version = SnapshotVersion {
            sequence,
            fingerprint,
            loaded_at: Utc::now(),
            medicines: medicines.len(),
            substances: tables.substances.len(),
            pharmacies: pharmacies.len(),
            atc_groups: atc_groups.len(),
            reimbursements: reimbursements.len(),
            skipped_rows: skipped,
        };

        Self {
            version,
            medicines,
            search_fields,
            by_code,
            by_substance,
            by_atc,
            atc_groups,
            reimbursements,
            documents,
            pharmacies,
            by_city,
            by_postal,
        }
    }

    pub fn version(&self) -> &SnapshotVersion {
        &self.version
    }

    pub fn lookup_by_code(&self, code: &SuklCode) -> Option<&MedicineRecord> {
        self.by_code.get(code).map(|&i| &self.medicines[i])
    }

    pub fn reimbursement(&self, code: &SuklCode) -> Option<&ReimbursementRecord> {
        self.reimbursements.get(code)
    }

    pub fn documents(&self, code: &SuklCode) -> Option<&DocumentRecord> {
        self.documents.get(code)
    }

    pub fn is_reimbursed(&self, code: &SuklCode) -> bool {
        self.reimbursement(code)
            .is_some_and(ReimbursementRecord::is_reimbursed)
    }

    /// Ranked literal search over names, substance names and ATC codes.
    pub fn search_by_substance_or_atc(
        &self,
        matcher: &FuzzyMatcher,
        text: &str,
        limit: usize,
        filters: SearchFilters,
    ) -> Vec<SearchHit> {
        let candidates = self
            .medicines
            .iter()
            .zip(&self.search_fields)
            .enumerate()
            .filter(|(_, (record, _))| self.passes(record, filters))
            .map(|(index, (record, fields))| Candidate {
                index,
                code: record.code.as_str(),
                fields,
            });

        matcher
            .rank(text, candidates, limit)
            .into_iter()
            .map(|ranked| SearchHit {
                record: self.medicines[ranked.index].clone(),
                score: ranked.score.score(),
                kind: ranked.score.kind,
            })
            .collect()
    }

    pub fn passes(&self, record: &MedicineRecord, filters: SearchFilters) -> bool {
        (!filters.only_available || record.is_available)
            && (!filters.only_reimbursed || self.is_reimbursed(&record.code))
    }

    /// Active pharmacies matching every given criterion, in register order.
    pub fn find_pharmacies(&self, criteria: &PharmacyCriteria) -> Vec<PharmacyRecord> {
        let city = criteria.city.as_deref().map(normalize);
        let postal = criteria.postal_code.as_deref().map(postal_key);

        let slots: Box<dyn Iterator<Item = usize> + '_> = match (&postal, &city) {
            (Some(psc), _) => Box::new(self.by_postal.get(psc).into_iter().flatten().copied()),
            (None, Some(city)) => Box::new(self.by_city.get(city).into_iter().flatten().copied()),
            (None, None) => Box::new(0..self.pharmacies.len()),
        };

        slots
            .map(|i| &self.pharmacies[i])
            .filter(|p| p.is_active)
            .filter(|p| city.as_ref().map_or(true, |c| normalize(&p.city) == *c))
            .filter(|p| !criteria.has_24h || p.has_24h_service)
            .filter(|p| !criteria.has_online_sales || p.has_internet_sales)
            .take(criteria.limit)
            .cloned()
            .collect()
    }

    pub fn atc_group(&self, code: &str) -> Option<AtcTree> {
        let code = code.trim().to_uppercase();
        let group = self.atc_groups.get(&code)?.clone();
        let subtree: Vec<&AtcGroup> = self
            .atc_groups
            .range(code.clone()..)
            .take_while(|(key, _)| key.starts_with(&code))
            .filter(|(key, _)| **key != code)
            .map(|(_, group)| group)
            .collect();
        Some(AtcTree {
            group,
            total_children: subtree.len(),
            children: subtree
                .into_iter()
                .take(ATC_CHILDREN_SHOWN)
                .cloned()
                .collect(),
        })
    }

    /// Same full ATC code or the same substance set, excluding the medicine
    /// itself. Available ones first, then by name.
    pub fn generic_alternatives(&self, code: &SuklCode, limit: usize) -> Vec<Alternative> {
        let Some(&origin) = self.by_code.get(code) else {
            return Vec::new();
        };
        let record = &self.medicines[origin];
        let mut found: BTreeSet<usize> = BTreeSet::new();

        if let Some(atc) = record.atc_code.as_deref().filter(|a| a.len() == 7) {
            if let Some(slots) = self.by_atc.get(atc) {
                found.extend(slots.iter().copied());
            }
        }

        let substance_set = |r: &MedicineRecord| -> BTreeSet<String> {
            r.substances.iter().map(|s| normalize(s)).collect()
        };
        let wanted = substance_set(record);
        if let Some(first) = wanted.iter().next() {
            if let Some(slots) = self.by_substance.get(first) {
                found.extend(
                    slots
                        .iter()
                        .copied()
                        .filter(|&i| substance_set(&self.medicines[i]) == wanted),
                );
            }
        }
        found.remove(&origin);

        let mut alternatives: Vec<&MedicineRecord> =
            found.into_iter().map(|i| &self.medicines[i]).collect();
        alternatives.sort_by(|a, b| {
            b.is_available
                .cmp(&a.is_available)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.code.cmp(&b.code))
        });
        alternatives
            .into_iter()
            .take(limit)
            .map(|r| Alternative {
                code: r.code.clone(),
                name: r.name.clone(),
                strength: r.strength.clone(),
                is_available: r.is_available,
            })
            .collect()
    }
}
