use std::cell::{Cell, RefCell};

use tempfile::TempDir;

use super::*;
use crate::store::{ensure_schema, load_run_results};

fn page_html(page: u32) -> String {
    format!(
        "<html><body>\n\
         <p style=\"position:absolute;top:100px;left:50px;white-space:nowrap\" class=\"ft00\">Scope&#160;1&#160;emissions</p>\n\
         <p style=\"position:absolute;top:101px;left:300px;white-space:nowrap\" class=\"ft01\"><b>{}</b></p>\n\
         </body></html>\n",
        page * 100
    )
}

struct FakeConverter {
    pages: u32,
    calls: Cell<usize>,
}

impl FakeConverter {
    fn new(pages: u32) -> Self {
        Self {
            pages,
            calls: Cell::new(0),
        }
    }
}

impl DocumentConverter for FakeConverter {
    fn convert(&self, document: &Document, _info: Option<&Value>) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        for page in 1..=self.pages {
            write_text(
                &document.working_dir.join(converted_page_file_name(page)),
                &page_html(page),
            )?;
        }
        write_text(&document.working_dir.join(ROOT_MARKER), "<html></html>\n")
    }
}

struct FailingConverter {
    failing_document: String,
    inner: FakeConverter,
}

impl DocumentConverter for FailingConverter {
    fn convert(&self, document: &Document, info: Option<&Value>) -> Result<()> {
        if document.file_name == self.failing_document {
            bail!("pdftohtml crashed on {}", document.file_name);
        }
        self.inner.convert(document, info)
    }
}

struct RecordingExtractor {
    html: HtmlPageExtractor,
    parse_filters: RefCell<Vec<PageFilter>>,
    load_filters: RefCell<Vec<PageFilter>>,
    render_calls: Cell<usize>,
}

impl RecordingExtractor {
    fn new() -> Self {
        Self {
            html: HtmlPageExtractor::new().expect("extractor regexes should compile"),
            parse_filters: RefCell::new(Vec::new()),
            load_filters: RefCell::new(Vec::new()),
            render_calls: Cell::new(0),
        }
    }

    fn parse_calls(&self) -> usize {
        self.parse_filters.borrow().len()
    }

    fn load_calls(&self) -> usize {
        self.load_filters.borrow().len()
    }
}

impl PageExtractor for RecordingExtractor {
    fn parse(&self, dir: &Path, filter: PageFilter) -> Result<PageDirectory> {
        self.parse_filters.borrow_mut().push(filter);
        self.html.parse(dir, filter)
    }

    fn render(&self, _document: &Document, _filter: PageFilter) -> Result<()> {
        self.render_calls.set(self.render_calls.get() + 1);
        Ok(())
    }

    fn load(&self, dir: &Path, filter: PageFilter) -> Result<PageDirectory> {
        self.load_filters.borrow_mut().push(filter);
        load_page_directory(dir, filter)
    }
}

#[derive(Default)]
struct PerPageAnalyzer {
    seen_pages: RefCell<Vec<Vec<u32>>>,
}

impl KpiAnalyzer for PerPageAnalyzer {
    fn find_kpis(
        &self,
        pages: &PageDirectory,
        year: i32,
        specs: &[KpiSpec],
        source: &str,
    ) -> Result<Vec<KpiMeasurement>> {
        self.seen_pages
            .borrow_mut()
            .push(pages.pages.iter().map(|page| page.page_num).collect());

        let mut measurements = Vec::new();
        for spec in specs {
            for page in &pages.pages {
                measurements.push(KpiMeasurement {
                    kpi_id: spec.id,
                    kpi_name: spec.name.clone(),
                    src_file: source.to_string(),
                    page_num: page.page_num,
                    year,
                    value: (page.page_num * 100).to_string(),
                });
            }
        }
        Ok(measurements)
    }
}

fn workspace() -> (TempDir, PipelineConfig) {
    let root = tempfile::tempdir().expect("tempdir");
    let input = root.path().join("input");
    let working = root.path().join("working");
    let output = root.path().join("output");
    fs::create_dir_all(&input).expect("create input folder");
    let config = PipelineConfig::with_folders(&input, &working, &output);
    (root, config)
}

fn add_document(config: &PipelineConfig, name: &str) -> Document {
    let path = config.input_folder.join(name);
    fs::write(&path, b"%PDF-1.4\n").expect("write pdf");
    Document::new(&path, &config.working_folder).expect("document")
}

fn scope1_spec() -> Vec<KpiSpec> {
    vec![KpiSpec {
        id: 6,
        name: "Scope 1 emissions".to_string(),
        label_patterns: vec!["scope 1 emissions".to_string()],
    }]
}

fn orchestrator<'a>(
    config: &'a PipelineConfig,
    converter: &'a dyn DocumentConverter,
    extractor: &'a dyn PageExtractor,
    analyzer: &'a dyn KpiAnalyzer,
) -> PipelineOrchestrator<'a> {
    PipelineOrchestrator::new(
        config,
        Collaborators {
            converter,
            extractor,
            analyzer,
        },
    )
    .expect("orchestrator should build")
}

#[test]
fn convert_is_skipped_when_root_marker_exists_unless_forced() {
    let (_root, mut config) = workspace();
    let document = add_document(&config, "report_2021.pdf");
    fs::create_dir_all(&document.working_dir).expect("create working dir");
    write_text(&document.working_dir.join(ROOT_MARKER), "<html></html>").expect("marker");

    let converter = FakeConverter::new(2);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();

    let outcome = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("document should analyze");
    assert_eq!(converter.calls.get(), 0);
    assert_eq!(outcome.convert, StageAction::Skipped);

    config.force_convert = true;
    let outcome = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("document should analyze");
    assert_eq!(converter.calls.get(), 1);
    assert_eq!(outcome.convert, StageAction::Ran);
}

#[test]
fn parse_runs_on_count_mismatch_and_is_skipped_when_counts_match() {
    let (_root, mut config) = workspace();
    let document = add_document(&config, "report_2021.pdf");
    let converter = FakeConverter::new(3);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();

    let first = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("first run");
    assert_eq!(first.parse, StageAction::Ran);
    assert_eq!(extractor.parse_calls(), 1);
    assert_eq!(extractor.render_calls.get(), 1);
    assert_eq!(
        matching_files(&document.working_dir, &compile_pattern("jpage*.json").expect("glob"))
            .expect("list parsed pages")
            .len(),
        3
    );

    let second = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("second run");
    assert_eq!(second.convert, StageAction::Skipped);
    assert_eq!(second.parse, StageAction::Skipped);
    assert_eq!(extractor.parse_calls(), 1);

    config.force_parse = true;
    let third = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("forced run");
    assert_eq!(third.parse, StageAction::Ran);
    assert_eq!(extractor.parse_calls(), 2);
    assert_eq!(converter.calls.get(), 1);
}

#[test]
fn fresh_full_parse_is_reused_without_reload() {
    let (_root, config) = workspace();
    let document = add_document(&config, "report_2021.pdf");
    let converter = FakeConverter::new(2);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();

    let outcome = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("document should analyze");

    assert!(!outcome.reloaded);
    assert_eq!(extractor.load_calls(), 0);
    assert_eq!(analyzer.seen_pages.borrow().as_slice(), &[vec![1, 2]]);
    assert_eq!(outcome.state, DocumentState::Analyzed);
}

#[test]
fn skipped_parse_reloads_structured_pages() {
    let (_root, config) = workspace();
    let document = add_document(&config, "report_2021.pdf");
    let converter = FakeConverter::new(2);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();
    let pipeline = orchestrator(&config, &converter, &extractor, &analyzer);

    let first = pipeline
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("first run");
    let second = pipeline
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("second run");

    assert!(second.reloaded);
    assert_eq!(extractor.load_filters.borrow().as_slice(), &[PageFilter::All]);
    assert_eq!(first.results, second.results);
}

#[test]
fn single_page_filter_reaches_parse_glob_and_analysis_scope() {
    let (_root, mut config) = workspace();
    config.page_filter = PageFilter::Page(2);
    let document = add_document(&config, "report_2021.pdf");
    let converter = FakeConverter::new(3);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();

    let outcome = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("document should analyze");

    assert_eq!(outcome.parse, StageAction::Ran);
    assert!(outcome.reloaded);
    assert_eq!(extractor.parse_filters.borrow().as_slice(), &[PageFilter::Page(2)]);
    assert_eq!(extractor.load_filters.borrow().as_slice(), &[PageFilter::Page(2)]);
    assert_eq!(analyzer.seen_pages.borrow().as_slice(), &[vec![2]]);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results.iter().next().map(|m| m.page_num), Some(2));
}

#[test]
fn assumed_conversion_skips_both_stages_and_loads_pages() {
    let (_root, mut config) = workspace();
    let document = add_document(&config, "report_2021.pdf");
    let converter = FakeConverter::new(2);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();

    orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("first run");

    config.assume_conversion_done = true;
    config.force_convert = true;
    let outcome = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("assumed run");

    assert_eq!(outcome.convert, StageAction::Assumed);
    assert_eq!(outcome.parse, StageAction::Assumed);
    assert!(outcome.reloaded);
    assert_eq!(converter.calls.get(), 1);
    assert_eq!(extractor.parse_calls(), 1);
    assert_eq!(outcome.results.len(), 2);
}

#[test]
fn fingerprint_cache_reparses_when_page_content_changes() {
    let (_root, mut config) = workspace();
    config.fingerprint_cache = true;
    let document = add_document(&config, "report_2021.pdf");
    let converter = FakeConverter::new(2);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();
    let pipeline = orchestrator(&config, &converter, &extractor, &analyzer);

    pipeline
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("first run");
    assert!(document.working_dir.join(FINGERPRINT_FILE).is_file());

    let unchanged = pipeline
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("unchanged run");
    assert_eq!(unchanged.parse, StageAction::Skipped);

    write_text(
        &document.working_dir.join(converted_page_file_name(1)),
        &page_html(7),
    )
    .expect("overwrite page");
    let changed = pipeline
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("changed run");
    assert_eq!(changed.parse, StageAction::Ran);
    assert_eq!(extractor.parse_calls(), 2);
}

#[test]
fn empty_spec_collection_yields_empty_results() {
    let (_root, config) = workspace();
    let document = add_document(&config, "report_2021.pdf");
    let converter = FakeConverter::new(2);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();

    let outcome = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &[], &InfoFile::default())
        .expect("empty specs are not an error");

    assert!(outcome.results.is_empty());
    assert!(analyzer.seen_pages.borrow().is_empty());
}

#[test]
fn fiscal_year_comes_from_file_name_or_default() {
    let (_root, mut config) = workspace();
    config.default_year = 2019;
    let converter = FakeConverter::new(1);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();
    let pipeline = orchestrator(&config, &converter, &extractor, &analyzer);

    assert_eq!(pipeline.guess_fiscal_year("T_Rowe_Price_2021_EN.pdf"), Some(2021));
    assert_eq!(pipeline.guess_fiscal_year("report-12021.pdf"), None);
    assert_eq!(pipeline.guess_fiscal_year("annual_report.pdf"), None);

    let document = add_document(&config, "annual_report.pdf");
    let outcome = pipeline
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect("document should analyze");
    assert_eq!(outcome.fiscal_year, 2019);
    assert!(outcome.results.iter().all(|m| m.year == 2019));
}

#[test]
fn converter_failure_propagates_out_of_the_orchestrator() {
    let (_root, config) = workspace();
    let document = add_document(&config, "broken_2021.pdf");
    let converter = FailingConverter {
        failing_document: "broken_2021.pdf".to_string(),
        inner: FakeConverter::new(1),
    };
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();

    let error = orchestrator(&config, &converter, &extractor, &analyzer)
        .analyze_document(&document, &scope1_spec(), &InfoFile::default())
        .expect_err("conversion failure should propagate");
    assert!(error.to_string().contains("pdftohtml crashed"));
    assert_eq!(extractor.parse_calls(), 0);
}

#[test]
fn batch_overall_results_equal_per_document_results_in_order() {
    let (_root, config) = workspace();
    let a = add_document(&config, "a_2020.pdf");
    let b = add_document(&config, "b_2021.pdf");
    let converter = FakeConverter::new(2);
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();
    let runner = BatchRunner::new(
        &config,
        orchestrator(&config, &converter, &extractor, &analyzer),
    );

    let mut connection = Connection::open_in_memory().expect("in-memory sqlite");
    ensure_schema(&connection).expect("schema");
    begin_run(&connection, "run-test", "2026-01-01T00:00:00Z").expect("begin run");

    let outcome = {
        let mut writer = ResultWriter::new(&config, Some((&mut connection, "run-test".to_string())));
        runner
            .run(
                &[a.clone(), b.clone()],
                &scope1_spec(),
                &InfoFile::default(),
                &mut writer,
            )
            .expect("batch should run")
    };

    let mut concatenated = KpiResultSet::default();
    for (_, results) in &outcome.per_document {
        concatenated.extend(results.clone());
    }
    assert_eq!(outcome.overall, concatenated);
    assert_eq!(outcome.overall.len(), 4);

    let sources: Vec<&str> = outcome.overall.iter().map(|m| m.src_file.as_str()).collect();
    assert_eq!(sources, vec!["a_2020.pdf", "a_2020.pdf", "b_2021.pdf", "b_2021.pdf"]);
    let years: Vec<i32> = outcome.overall.iter().map(|m| m.year).collect();
    assert_eq!(years, vec![2020, 2020, 2021, 2021]);

    let aggregate = fs::read_to_string(config.aggregate_csv_path()).expect("aggregate csv");
    let rows: Vec<&str> = aggregate.lines().skip(1).collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[0].contains("a_2020.pdf"));
    assert!(rows[3].contains("b_2021.pdf"));
    assert!(config.output_folder.join("a_2020.pdf.csv").is_file());
    assert!(config.output_folder.join("b_2021.pdf.csv").is_file());

    let stored = load_run_results(&connection, "run-test").expect("stored results");
    assert_eq!(stored, outcome.per_document);
}

#[test]
fn batch_aborts_on_failure_unless_continue_on_error() {
    let (_root, mut config) = workspace();
    let a = add_document(&config, "a_2020.pdf");
    let b = add_document(&config, "b_2021.pdf");
    let converter = FailingConverter {
        failing_document: "a_2020.pdf".to_string(),
        inner: FakeConverter::new(1),
    };
    let extractor = RecordingExtractor::new();
    let analyzer = PerPageAnalyzer::default();
    let documents = [a, b];

    {
        let runner = BatchRunner::new(
            &config,
            orchestrator(&config, &converter, &extractor, &analyzer),
        );
        let mut writer = ResultWriter::new(&config, None);
        let error = runner
            .run(&documents, &scope1_spec(), &InfoFile::default(), &mut writer)
            .expect_err("first failure aborts the batch");
        assert!(format!("{error:#}").contains("a_2020.pdf"));
        assert_eq!(converter.inner.calls.get(), 0);
    }

    config.continue_on_error = true;
    let runner = BatchRunner::new(
        &config,
        orchestrator(&config, &converter, &extractor, &analyzer),
    );
    let mut writer = ResultWriter::new(&config, None);
    let outcome = runner
        .run(&documents, &scope1_spec(), &InfoFile::default(), &mut writer)
        .expect("batch continues past failures");

    assert_eq!(outcome.failed_document_count, 1);
    assert_eq!(outcome.per_document.len(), 1);
    assert_eq!(outcome.per_document[0].0, "b_2021.pdf");
    assert_eq!(outcome.entries.len(), 2);
    assert!(outcome.entries[0].error.is_some());
    assert_eq!(outcome.warnings.len(), 1);
}

#[test]
fn discover_documents_sorts_and_applies_name_filter() {
    let (_root, mut config) = workspace();
    add_document(&config, "b_2021.pdf");
    add_document(&config, "a_2020.PDF");
    fs::write(config.input_folder.join("notes.txt"), "x").expect("write notes");

    let names: Vec<String> = discover_documents(&config)
        .expect("discover")
        .into_iter()
        .map(|document| document.file_name)
        .collect();
    assert_eq!(names, vec!["a_2020.PDF".to_string(), "b_2021.pdf".to_string()]);

    config.pdf_name = Some("b_2021.pdf".to_string());
    let filtered = discover_documents(&config).expect("discover");
    assert_eq!(filtered.len(), 1);
    assert_eq!(
        filtered[0].working_dir,
        config.working_folder.join("b_2021.pdf_html")
    );
}

#[test]
fn html_pages_parse_into_positioned_lines() {
    let extractor = HtmlPageExtractor::new().expect("regexes");
    let html = r#"<p style="position:absolute;top:100px;left:50px;white-space:nowrap" class="ft00">Scope&#160;1&#160;emissions</p>
<p style="position:absolute;top:101px;left:300px;white-space:nowrap" class="ft01"><b>1,234</b></p>
<p style="position:absolute;top:140px;left:50px;white-space:nowrap" class="ft00">Water&amp;waste</p>"#;

    let page = extractor.parse_page_html(4, html);
    assert_eq!(page.page_num, 4);
    assert_eq!(page.items.len(), 3);
    assert_eq!(
        page.lines(),
        vec!["Scope 1 emissions 1,234".to_string(), "Water&waste".to_string()]
    );
}

#[test]
fn rule_based_analyzer_takes_first_non_year_number_after_label() {
    let analyzer = RuleBasedAnalyzer::new().expect("regexes");
    let pages = PageDirectory::new(vec![
        PageData {
            page_num: 3,
            items: vec![TextItem {
                top: 10.0,
                left: 10.0,
                text: "Total Scope 1 emissions 2021 1,234.5 tCO2e".to_string(),
            }],
        },
        PageData {
            page_num: 1,
            items: vec![TextItem {
                top: 10.0,
                left: 10.0,
                text: "Scope 1 emissions were reported".to_string(),
            }],
        },
    ]);

    let found = analyzer
        .find_kpis(&pages, 2021, &scope1_spec(), "report_2021.pdf")
        .expect("analysis");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value, "1234.5");
    assert_eq!(found[0].page_num, 3);
    assert_eq!(found[0].year, 2021);
    assert_eq!(found[0].src_file, "report_2021.pdf");
}

#[test]
fn info_file_must_exist_and_be_an_object() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("info.json");
    assert!(InfoFile::load(&path).is_err());

    fs::write(&path, r#"{"report_2021.pdf": {"first_page": 2}}"#).expect("write info");
    let info = InfoFile::load(&path).expect("info loads");
    assert_eq!(
        info.document("report_2021.pdf")
            .and_then(|value| value.get("first_page"))
            .and_then(Value::as_u64),
        Some(2)
    );

    fs::write(&path, "[]").expect("write info");
    assert!(InfoFile::load(&path).is_err());
}

#[test]
fn poppler_page_outputs_are_renamed_to_padded_page_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in ["raw-1.html", "raw-12.html", "raw.html", "raw_ind.html"] {
        fs::write(dir.path().join(name), "<html></html>").expect("write raw page");
    }

    let html = raw_output_pattern(RAW_HTML_PREFIX, "html").expect("regex");
    let pages = rename_numbered_files(dir.path(), &html, converted_page_file_name)
        .expect("rename pages");
    assert_eq!(pages, vec![1, 12]);
    assert!(dir.path().join("page00001.html").is_file());
    assert!(dir.path().join("page00012.html").is_file());
    assert!(!dir.path().join("raw-1.html").exists());
    assert!(dir.path().join("raw.html").is_file());
    assert!(dir.path().join("raw_ind.html").is_file());
}

#[test]
fn zero_padded_image_numbers_map_to_their_pages() {
    let image = raw_output_pattern(RAW_IMAGE_PREFIX, "png").expect("regex");

    let two_digit = tempfile::tempdir().expect("tempdir");
    for name in ["img-01.png", "img-10.png"] {
        fs::write(two_digit.path().join(name), b"png").expect("write image");
    }
    let pages = rename_numbered_files(two_digit.path(), &image, rendered_page_file_name)
        .expect("rename images");
    assert_eq!(pages, vec![1, 10]);
    assert!(two_digit.path().join("page00001.png").is_file());
    assert!(two_digit.path().join("page00010.png").is_file());

    let three_digit = tempfile::tempdir().expect("tempdir");
    for name in ["img-001.png", "img-100.png", "notes.png"] {
        fs::write(three_digit.path().join(name), b"png").expect("write image");
    }
    let pages = rename_numbered_files(three_digit.path(), &image, rendered_page_file_name)
        .expect("rename images");
    assert_eq!(pages, vec![1, 100]);
    assert!(three_digit.path().join("page00001.png").is_file());
    assert!(three_digit.path().join("page00100.png").is_file());
    assert!(!three_digit.path().join("img-001.png").exists());
    assert!(three_digit.path().join("notes.png").is_file());
}
