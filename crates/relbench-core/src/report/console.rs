use super::RunSummary;

pub fn print_summary(s: &RunSummary) {
    eprintln!("Run {} ({})", s.run_key, s.model_label);
    eprintln!(
        "Results: items={} valid={} agreement={:.2}% invalid={:.2}% elapsed={}",
        s.items,
        s.valid,
        s.agreement_pct(),
        s.invalid_pct,
        format_hms(s.elapsed_ms)
    );
}

pub fn format_hms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
