use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use epi_curves::app::pipeline::run_reconcile;
use epi_curves::config::RunConfig;
use epi_curves::data::{SyntheticConfig, generate_feeds, write_feeds};
use epi_curves::domain::Provenance;
use epi_curves::io::bundle::{read_bundle_json, write_bundle_json};
use epi_curves::io::export::write_reconciled_csv;

fn d(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, month, day).unwrap()
}

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

const CONFIG: &str = r#"
[engine]
window = 2
tail_lag_days = 0
min_overlap_days = 3

[primary]
key = "positives"
label = "Positives"
path = "county.csv"
date_column = "Result_Date"
value_column = "Positives"

[reference]
key = "cases"
label = "Reference cases"
path = "us-counties.csv"
date_column = "date"
value_column = "cases"
cumulative = true
filters = { state = "Washington", county = "King" }

[output]
csv = "out/positives.csv"
bundle = "out/bundle.json"
"#;

fn write_inputs(dir: &Path) {
    write(
        dir,
        "county.csv",
        "Result_Date,Positives\n\
         03/01/2020,10\n\
         03/02/2020,20\n\
         03/03/2020,30\n\
         ,7\n",
    );
    // King running totals: 100, 105, 115, 130, 150 -> daily 5, 10, 15, 20.
    write(
        dir,
        "us-counties.csv",
        "date,county,state,cases\n\
         2020-02-29,King,Washington,100\n\
         2020-02-29,Pierce,Washington,1\n\
         2020-03-01,King,Washington,105\n\
         2020-03-02,King,Washington,115\n\
         2020-03-02,Pierce,Washington,9\n\
         2020-03-03,King,Washington,130\n\
         2020-03-04,King,Washington,150\n",
    );
    write(dir, "epi.toml", CONFIG);
}

#[test]
fn reconciles_files_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let config = RunConfig::load(&dir.path().join("epi.toml")).unwrap();
    let run = run_reconcile(&config).unwrap();

    // 60 / 30 over 3/1..=3/3, so 3/4 is 20 * 2.
    let cal = run.reconciled.calibration().unwrap();
    assert_eq!(cal.ratio, 2.0);
    assert_eq!(cal.overlap_days, 3);
    assert_eq!(run.reconciled.last_reported_date(), d(3, 3));
    assert_eq!(run.reconciled.provenance_at(d(3, 4)), Some(Provenance::Projected));
    assert_eq!(run.reconciled.to_series().value_at(d(3, 4)), Some(40.0));

    assert_eq!(run.sources[0].dropped.missing_date, 1);
    assert_eq!(run.sources[1].rows_filtered, 2);

    let csv_path = config.output.csv.clone().unwrap();
    write_reconciled_csv(&csv_path, &run.reconciled, &run.headline).unwrap();
    let text = fs::read_to_string(&csv_path).unwrap();
    assert!(text.ends_with("2020-03-04,40.0,projected,35.0\n"));

    let bundle_path = config.output.bundle.clone().unwrap();
    write_bundle_json(&bundle_path, &run.bundle).unwrap();
    let bundle = read_bundle_json(&bundle_path).unwrap();
    assert_eq!(bundle.headline.projected_count(), 1);
    assert_eq!(bundle.display_range, run.display_range);
}

#[test]
fn short_overlap_exits_with_insufficient_data() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    write(
        dir.path(),
        "epi.toml",
        &CONFIG.replace("min_overlap_days = 3", "min_overlap_days = 10"),
    );

    let config = RunConfig::load(&dir.path().join("epi.toml")).unwrap();
    let err = run_reconcile(&config).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(err.message().contains("at least 10"));
}

#[test]
fn missing_column_exits_with_input_error() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    write(
        dir.path(),
        "epi.toml",
        &CONFIG.replace("value_column = \"Positives\"", "value_column = \"Deaths\""),
    );

    let config = RunConfig::load(&dir.path().join("epi.toml")).unwrap();
    let err = run_reconcile(&config).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.message().contains("Deaths"));
}

#[test]
fn simulated_feeds_recover_the_true_ratio() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SyntheticConfig::new(d(3, 1), 120, 42, 5, 1.6);
    let feeds = generate_feeds(&sim).unwrap();
    let path = write_feeds(dir.path(), &feeds, &sim).unwrap();

    let config = RunConfig::load(&path).unwrap();
    let run = run_reconcile(&config).unwrap();

    assert_eq!(run.reconciled.projected_count(), 5);
    let ratio = run.reconciled.calibration().unwrap().ratio;
    assert!((ratio - 1.6).abs() < 0.1, "ratio {ratio}");

    assert_eq!(run.bundle.metrics.len(), 1);
    assert_eq!(run.bundle.ratios.len(), 1);
    assert_eq!(run.display_range.map(|r| r.min_date()), Some(d(3, 1)));
}
