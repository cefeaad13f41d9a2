use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use arrow::array::Array;
use flate2::write::GzEncoder;
use flate2::Compression;

use hoa_features::features::encode::HOA_ID;
use hoa_features::ingest::read_delimited_file;
use hoa_features::pipeline::{LONG_CHECKPOINT, OUTPUT_FILE, RAW_CHECKPOINT};
use hoa_features::utils::{float_column, read_parquet, string_column};
use hoa_features::{Pipeline, PipelineConfig, PipelineError, PriceReference, TRAINING_COLUMNS};

struct TestDir {
    root: PathBuf,
}

impl TestDir {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "hoa-features-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn path(&self) -> &Path {
        &self.root
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn write_gz(path: &Path, contents: &[u8]) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(contents).unwrap();
    encoder.finish().unwrap();
}

fn write_price_files(dir: &Path) -> (PathBuf, PathBuf) {
    let zip_path = dir.join("listing_price_by_zip.txt");
    fs::write(&zip_path, "zip|median_price\n90210|1200000\n").unwrap();
    let state_path = dir.join("listing_price_by_state.txt");
    fs::write(&state_path, "state|median_price\nTX|350000\n").unwrap();
    (zip_path, state_path)
}

/// Two dump files: one gzipped, one already decompressed, plus a corrupt
/// archive that must be skipped without failing the run.
fn write_dumps(dir: &Path) {
    let header = "PropertyID|HOA1FeeValue|HOA1Type|HOA2FeeValue|HOA2Type|SitusZIP5|SitusState\n";
    let dump_a = format!("{header}P1|75|HOA|25|COA|90210|CA\n");
    write_gz(&dir.join("HOA_dump_a.txt.gz"), dump_a.as_bytes());

    let dump_b = format!("{header}P2|40|||||TX\n");
    fs::write(dir.join("HOA_dump_b.txt"), dump_b).unwrap();

    fs::write(dir.join("HOA_corrupt.txt.gz"), b"not a gzip stream").unwrap();
}

fn config_for(dir: &TestDir) -> PipelineConfig {
    PipelineConfig {
        input_dir: dir.path().join("input"),
        output_dir: dir.path().join("output"),
        ..PipelineConfig::default()
    }
}

#[test]
fn pipeline_builds_the_aligned_matrix_end_to_end() {
    let dir = TestDir::new("end-to-end");
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    write_dumps(&input);
    let (zip_path, state_path) = write_price_files(&input);

    let config = config_for(&dir);
    let prices = PriceReference::from_files(&zip_path, &state_path, config.delimiter).unwrap();
    let output = Pipeline::new(config.clone()).run(&prices).unwrap();

    // Both checkpoints exist alongside the final matrix.
    assert!(config.output_dir.join(RAW_CHECKPOINT).exists());
    assert!(config.output_dir.join(LONG_CHECKPOINT).exists());
    assert_eq!(output, config.output_dir.join(OUTPUT_FILE));

    let matrix = read_parquet(&output).unwrap();
    // hoa_id plus the full training schema; every observed level is part
    // of the fixed list, so no extra columns this time.
    assert_eq!(matrix.num_columns(), TRAINING_COLUMNS.len() + 1);
    assert_eq!(matrix.num_rows(), 3);

    let ids = string_column(&matrix, HOA_ID).unwrap();
    let collected: Vec<&str> = (0..3).map(|i| ids.value(i)).collect();
    assert_eq!(collected, vec!["P1_1", "P1_2", "P2_1"]);

    // P1 matched on zip, P2's blank zip fell back to the TX state median.
    let median = float_column(&matrix, "median_price").unwrap();
    assert_eq!(median.value(0), 1_200_000.0);
    assert_eq!(median.value(2), 350_000.0);

    let totals = float_column(&matrix, "total_fees").unwrap();
    assert_eq!(totals.value(0), 100.0);
    assert_eq!(totals.value(2), 40.0);

    // A state never seen at training time would be extra; CA and TX are not.
    let ca = float_column(&matrix, "SitusState_CA").unwrap();
    assert_eq!(ca.value(0), 1.0);
    assert_eq!(ca.value(2), 0.0);
}

#[test]
fn long_checkpoint_retains_blank_slots() {
    let dir = TestDir::new("checkpoint");
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    write_dumps(&input);
    let (zip_path, state_path) = write_price_files(&input);

    let config = config_for(&dir);
    let prices = PriceReference::from_files(&zip_path, &state_path, config.delimiter).unwrap();
    Pipeline::new(config.clone()).run(&prices).unwrap();

    // Two properties x two slots; P2's blank slot 2 is still present here.
    let long = read_parquet(&config.output_dir.join(LONG_CHECKPOINT)).unwrap();
    assert_eq!(long.num_rows(), 4);
    let fees = float_column(&long, &config.fee_column).unwrap();
    assert_eq!(fees.null_count(), 1);
}

#[test]
fn pipeline_aligns_to_an_explicit_training_schema() {
    let dir = TestDir::new("custom-schema");
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    write_dumps(&input);
    let (zip_path, state_path) = write_price_files(&input);

    let config = config_for(&dir);
    let prices = PriceReference::from_files(&zip_path, &state_path, config.delimiter).unwrap();

    // A retrained model that never saw state indicators but expects PUD.
    let training = [
        "TypeHOA__COA",
        "TypeHOA__HOA",
        "TypeHOA__PUD",
        "TypeHOA__nan",
        "FeeValueHOA_",
        "prop_total_fees",
        "total_fees",
        "median_price",
        "num_hoas",
    ];
    let pipeline = Pipeline::with_training_columns(
        config,
        training.iter().map(ToString::to_string).collect(),
    );
    let output = pipeline.run(&prices).unwrap();

    let matrix = read_parquet(&output).unwrap();
    let names: Vec<&str> = matrix
        .schema_ref()
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect();
    assert_eq!(names[0], HOA_ID);
    assert_eq!(&names[1..=training.len()], &training[..]);
    // The three observed state indicators are extras, kept after the
    // fixed part.
    assert_eq!(names.len(), training.len() + 4);

    // PUD never occurred, so its indicator was zero-filled.
    let pud = float_column(&matrix, "TypeHOA__PUD").unwrap();
    for row in 0..matrix.num_rows() {
        assert_eq!(pud.value(row), 0.0);
    }
}

#[test]
fn identical_inputs_produce_identical_outputs() {
    let dir = TestDir::new("determinism");
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    write_dumps(&input);
    let (zip_path, state_path) = write_price_files(&input);

    let config = config_for(&dir);
    let prices = PriceReference::from_files(&zip_path, &state_path, config.delimiter).unwrap();

    let first_path = Pipeline::new(config.clone()).run(&prices).unwrap();
    let first = read_parquet(&first_path).unwrap();
    let second_path = Pipeline::new(config).run(&prices).unwrap();
    let second = read_parquet(&second_path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn unmapped_geography_aborts_the_run() {
    let dir = TestDir::new("unmapped");
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();

    let header = "PropertyID|HOA1FeeValue|HOA1Type|SitusZIP5|SitusState\n";
    fs::write(
        input.join("HOA_dump.txt"),
        format!("{header}P9|50|HOA|00000|ZZ\n"),
    )
    .unwrap();

    let result = Pipeline::new(config_for(&dir)).run(&PriceReference::default());
    assert!(matches!(result, Err(PipelineError::MissingValues(_))));
}

#[test]
fn legacy_encoding_is_decoded_as_windows_1252() {
    let dir = TestDir::new("encoding");
    let path = dir.path().join("HOA_names.txt");
    // "Renée" with the e-acute as the single cp1252 byte 0xE9.
    let mut contents = b"PropertyID|OwnerName\nP1|Ren".to_vec();
    contents.push(0xE9);
    contents.extend_from_slice(b"e\n");
    fs::write(&path, contents).unwrap();

    let batch = read_delimited_file(&path, b'|', 1024).unwrap();
    let owners = string_column(&batch, "OwnerName").unwrap();
    assert_eq!(owners.value(0), "Renée");
}

#[test]
fn empty_input_directory_is_an_ingest_error() {
    let dir = TestDir::new("empty");
    let result = Pipeline::new(PipelineConfig {
        input_dir: dir.path().to_path_buf(),
        output_dir: dir.path().join("output"),
        ..PipelineConfig::default()
    })
    .run(&PriceReference::default());
    assert!(matches!(result, Err(PipelineError::Ingest(_))));
}
