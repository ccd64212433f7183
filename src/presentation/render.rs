// Terminal rendering of resolver results
use crate::presentation::theme::Theme;
use std::fmt::Write;
use sukl_registry::{
    AtcInfo, AvailabilityInfo, DetailResult, HealthReport, MedicineRecord, PharmacyResult,
    Provenance, ReimbursementInfo, SearchResult,
};

fn price(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2} Kč", v))
        .unwrap_or_else(|| "-".to_string())
}

fn source_line(output: &mut String, theme: &Theme, provenance: Provenance) {
    let label = match provenance {
        Provenance::Remote => "online registry".to_string(),
        Provenance::Bulk => "bulk dataset".to_string(),
        Provenance::BulkFallback(_) => format!("bulk dataset, remote unavailable ({})", provenance),
    };
    writeln!(output, "{}", (theme.source)(&format!("[{}]", label))).ok();
}

fn field(output: &mut String, theme: &Theme, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        writeln!(output, "  {:<14} {}", (theme.label)(label), (theme.value)(value)).ok();
    }
}

fn medicine_lines(output: &mut String, theme: &Theme, record: &MedicineRecord) {
    writeln!(
        output,
        "{} {}",
        (theme.code)(record.code.as_str()),
        (theme.title)(&record.name)
    )
    .ok();
    field(output, theme, "strength", record.strength.as_deref());
    field(output, theme, "form", record.form_code.as_deref());
    field(output, theme, "package", record.package.as_deref());
    field(output, theme, "ATC", record.atc_code.as_deref());
    if !record.substances.is_empty() {
        field(output, theme, "substances", Some(&record.substances.join(", ")));
    }
    field(output, theme, "registration", record.registration_status.as_deref());
    field(output, theme, "reg. number", record.registration_number.as_deref());
    field(output, theme, "dispensing", record.dispensing_mode.as_deref());
    field(output, theme, "holder", record.holder.as_deref());
    writeln!(
        output,
        "  {:<14} {}",
        (theme.label)("supplied"),
        theme.flag(record.is_available, "yes", "no")
    )
    .ok();
    if let Some(pricing) = &record.pricing {
        field(output, theme, "max price", Some(&price(pricing.max_retail_price)));
        field(output, theme, "reimbursed", Some(&price(pricing.reimbursement_amount)));
        field(output, theme, "copay", Some(&price(pricing.patient_copay)));
    }
    if let Some(docs) = &record.documents {
        field(output, theme, "PIL", docs.pil.as_deref());
        field(output, theme, "SPC", docs.spc.as_deref());
    }
}

pub fn format_search(result: &SearchResult, theme: &Theme) -> String {
    let mut output = String::new();
    source_line(&mut output, theme, result.provenance);
    if result.hits.is_empty() {
        writeln!(output, "No medicines match '{}'", result.query).ok();
    }
    for (i, hit) in result.hits.iter().enumerate() {
        let record = &hit.record;
        writeln!(
            output,
            "{:>3}. {} {} {} {}",
            i + 1,
            (theme.code)(record.code.as_str()),
            (theme.title)(&record.name),
            record.strength.as_deref().unwrap_or(""),
            (theme.dim)(&format!("({:?}, {})", hit.kind, hit.score))
        )
        .ok();
    }
    if result.omitted > 0 {
        writeln!(
            output,
            "{}",
            (theme.dim)(&format!("{} results could not be fetched", result.omitted))
        )
        .ok();
    }
    output
}

pub fn format_detail(result: &DetailResult, theme: &Theme) -> String {
    let mut output = String::new();
    source_line(&mut output, theme, result.provenance);
    medicine_lines(&mut output, theme, &result.record);
    if !result.bulk_merged {
        writeln!(output, "{}", (theme.dim)("prices and documents unavailable")).ok();
    }
    output
}

pub fn format_availability(info: &AvailabilityInfo, theme: &Theme) -> String {
    let mut output = String::new();
    source_line(&mut output, theme, info.provenance);
    writeln!(
        output,
        "{} {} {}",
        (theme.code)(info.code.as_str()),
        (theme.title)(&info.name),
        theme.flag(info.is_available, "supplied", "not supplied")
    )
    .ok();
    field(&mut output, theme, "registration", info.registration_status.as_deref());
    field(&mut output, theme, "dispensing", info.dispensing_mode.as_deref());
    if !info.alternatives.is_empty() {
        writeln!(output, "  Alternatives:").ok();
        for alt in &info.alternatives {
            writeln!(
                output,
                "    {} {} {} {}",
                (theme.code)(alt.code.as_str()),
                alt.name,
                alt.strength.as_deref().unwrap_or(""),
                theme.flag(alt.is_available, "supplied", "not supplied")
            )
            .ok();
        }
    }
    writeln!(
        output,
        "{}",
        (theme.dim)(&format!("checked {}", info.checked_at.format("%Y-%m-%d %H:%M UTC")))
    )
    .ok();
    output
}

pub fn format_reimbursement(info: &ReimbursementInfo, theme: &Theme) -> String {
    let mut output = String::new();
    source_line(&mut output, theme, info.provenance);
    writeln!(
        output,
        "{} {} {}",
        (theme.code)(info.code.as_str()),
        (theme.title)(&info.name),
        theme.flag(info.is_reimbursed, "reimbursed", "not reimbursed")
    )
    .ok();
    match &info.reimbursement {
        Some(r) => {
            field(&mut output, theme, "producer max", Some(&price(r.max_producer_price)));
            field(&mut output, theme, "retail max", Some(&price(r.max_retail_price)));
            field(&mut output, theme, "reimbursement", Some(&price(r.reimbursement_amount)));
            field(&mut output, theme, "copay", Some(&price(r.patient_copay)));
            field(&mut output, theme, "group", r.reimbursement_group.as_deref());
            field(&mut output, theme, "indication", r.indication_limit.as_deref());
            field(&mut output, theme, "prescription", r.prescription_limit.as_deref());
            if r.specialist_only {
                field(&mut output, theme, "specialist", Some("required"));
            }
        }
        None => {
            writeln!(output, "  No price record").ok();
        }
    }
    output
}

pub fn format_pharmacies(result: &PharmacyResult, theme: &Theme) -> String {
    let mut output = String::new();
    source_line(&mut output, theme, result.provenance);
    if result.pharmacies.is_empty() {
        writeln!(output, "No pharmacies found").ok();
    }
    for p in &result.pharmacies {
        let address = [p.street.as_deref(), p.postal_code.as_deref(), Some(p.city.as_str())]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        let mut tags = Vec::new();
        if p.has_24h_service {
            tags.push("24h");
        }
        if p.has_internet_sales {
            tags.push("online");
        }
        writeln!(
            output,
            "{} {} {}",
            (theme.title)(&p.name),
            address,
            (theme.good)(&tags.join(" "))
        )
        .ok();
        field(&mut output, theme, "phone", p.phone.as_deref());
        field(&mut output, theme, "web", p.web.as_deref());
    }
    output
}

pub fn format_atc(info: &AtcInfo, theme: &Theme) -> String {
    let mut output = String::new();
    source_line(&mut output, theme, info.provenance);
    writeln!(
        output,
        "{} {} {}",
        (theme.code)(&info.group.code),
        (theme.title)(&info.group.name),
        (theme.dim)(&format!("level {}", info.group.level))
    )
    .ok();
    for child in &info.children {
        writeln!(output, "  {} {}", (theme.code)(&child.code), child.name).ok();
    }
    if info.total_children > info.children.len() {
        writeln!(
            output,
            "{}",
            (theme.dim)(&format!(
                "  ... {} more",
                info.total_children - info.children.len()
            ))
        )
        .ok();
    }
    output
}

pub fn format_health(report: &HealthReport, theme: &Theme) -> String {
    let mut output = String::new();
    writeln!(output, "{}", (theme.title)("SÚKL registry status")).ok();
    let remote = &report.remote;
    writeln!(
        output,
        "  {:<14} {} ({} ms{})",
        (theme.label)("remote"),
        theme.flag(remote.reachable, "reachable", "unreachable"),
        remote.latency_ms,
        remote
            .status_code
            .map(|s| format!(", HTTP {}", s))
            .unwrap_or_default()
    )
    .ok();
    field(&mut output, theme, "remote error", remote.error.as_deref());
    match &report.dataset {
        Some(v) => {
            let summary = format!(
                "#{} loaded {}, {} medicines, {} pharmacies, {} skipped rows",
                v.sequence,
                v.loaded_at.format("%Y-%m-%d %H:%M"),
                v.medicines,
                v.pharmacies,
                v.skipped_rows
            );
            field(&mut output, theme, "dataset", Some(&summary));
        }
        None => field(&mut output, theme, "dataset", Some("not loaded")),
    }
    let cache = &report.cache;
    let summary = format!(
        "{} entries ({} stale), {} hits, {} misses",
        cache.entries, cache.stale_entries, cache.hits, cache.misses
    );
    field(&mut output, theme, "cache", Some(&summary));
    output
}
