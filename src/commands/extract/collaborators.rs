use super::*;

const LINE_TOLERANCE: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextItem {
    pub top: f64,
    pub left: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PageData {
    pub page_num: u32,
    pub items: Vec<TextItem>,
}

impl PageData {
    pub fn lines(&self) -> Vec<String> {
        let mut items: Vec<&TextItem> = self.items.iter().collect();
        items.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));

        let mut lines: Vec<(f64, Vec<&TextItem>)> = Vec::new();
        for item in items {
            match lines.last_mut() {
                Some((top, members)) if (item.top - *top).abs() <= LINE_TOLERANCE => {
                    members.push(item)
                }
                _ => lines.push((item.top, vec![item])),
            }
        }

        lines
            .into_iter()
            .map(|(_, mut members)| {
                members.sort_by(|a, b| a.left.total_cmp(&b.left));
                members
                    .iter()
                    .map(|item| item.text.trim())
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<&str>>()
                    .join(" ")
            })
            .filter(|line| !line.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageDirectory {
    pub pages: Vec<PageData>,
}

impl PageDirectory {
    pub fn new(mut pages: Vec<PageData>) -> Self {
        pages.sort_by_key(|page| page.page_num);
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InfoFile {
    entries: serde_json::Map<String, Value>,
}

impl InfoFile {
    pub fn load(path: &Path) -> Result<Self> {
        let value: Value = read_json(path)?;
        let Value::Object(entries) = value else {
            bail!("info file is not a JSON object: {}", path.display());
        };

        info!(path = %path.display(), documents = entries.len(), "loaded info file");
        Ok(Self { entries })
    }

    pub fn document(&self, file_name: &str) -> Option<&Value> {
        self.entries.get(file_name)
    }
}

pub trait DocumentConverter {
    fn convert(&self, document: &Document, info: Option<&Value>) -> Result<()>;
}

pub trait PageExtractor {
    fn parse(&self, dir: &Path, filter: PageFilter) -> Result<PageDirectory>;

    fn render(&self, document: &Document, filter: PageFilter) -> Result<()>;

    fn save(&self, pages: &PageDirectory, dir: &Path) -> Result<()> {
        save_page_directory(pages, dir)
    }

    fn load(&self, dir: &Path, filter: PageFilter) -> Result<PageDirectory> {
        load_page_directory(dir, filter)
    }
}

pub trait KpiAnalyzer {
    fn find_kpis(
        &self,
        pages: &PageDirectory,
        year: i32,
        specs: &[KpiSpec],
        source: &str,
    ) -> Result<Vec<KpiMeasurement>>;
}

#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub converter: &'a dyn DocumentConverter,
    pub extractor: &'a dyn PageExtractor,
    pub analyzer: &'a dyn KpiAnalyzer,
}

pub fn structured_page_file_name(page_num: u32) -> String {
    format!("jpage{page_num:05}.json")
}

pub fn save_page_directory(pages: &PageDirectory, dir: &Path) -> Result<()> {
    for page in &pages.pages {
        write_json_pretty(&dir.join(structured_page_file_name(page.page_num)), page)?;
    }
    Ok(())
}

pub fn load_page_directory(dir: &Path, filter: PageFilter) -> Result<PageDirectory> {
    let pattern = compile_pattern(&filter.json_glob())?;
    let mut pages = Vec::new();
    for path in matching_files(dir, &pattern)? {
        let page: PageData = read_json(&path)?;
        pages.push(page);
    }

    Ok(PageDirectory::new(pages))
}

pub fn compile_pattern(glob: &str) -> Result<Pattern> {
    Pattern::new(glob).with_context(|| format!("invalid file pattern: {glob}"))
}

pub fn matching_files(dir: &Path, pattern: &Pattern) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| pattern.matches(name))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
