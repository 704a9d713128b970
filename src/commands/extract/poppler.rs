use super::*;

pub const RAW_HTML_PREFIX: &str = "raw";
pub const RAW_IMAGE_PREFIX: &str = "img";

// poppler names its per-page output `<prefix>-<n>.<ext>`; pdftoppm zero-pads `n`.
pub fn raw_output_pattern(prefix: &str, extension: &str) -> Result<Regex> {
    Regex::new(&format!(r"^{prefix}-(\d+)\.{extension}$"))
        .with_context(|| format!("failed to compile {prefix}-N.{extension} name regex"))
}

pub fn converted_page_file_name(page_num: u32) -> String {
    format!("page{page_num:05}.html")
}

pub fn rendered_page_file_name(page_num: u32) -> String {
    format!("page{page_num:05}.png")
}

#[derive(Debug)]
pub struct PdfToHtml {
    raw_page: Regex,
}

impl PdfToHtml {
    pub fn new() -> Result<Self> {
        Ok(Self {
            raw_page: raw_output_pattern(RAW_HTML_PREFIX, "html")?,
        })
    }
}

impl DocumentConverter for PdfToHtml {
    fn convert(&self, document: &Document, info: Option<&Value>) -> Result<()> {
        let dir = &document.working_dir;
        ensure_directory(dir)?;

        let mut command = Command::new("pdftohtml");
        command.arg("-c").arg("-i").arg("-q");
        if let Some(first_page) = info_page(info, "first_page") {
            command.arg("-f").arg(first_page.to_string());
        }
        if let Some(last_page) = info_page(info, "last_page") {
            command.arg("-l").arg(last_page.to_string());
        }
        command.arg(&document.path).arg(dir.join(RAW_HTML_PREFIX));

        let output = command.output().with_context(|| {
            format!("failed to execute pdftohtml for {}", document.path.display())
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftohtml returned non-zero exit status for {}: {}",
                document.path.display(),
                stderr.trim()
            );
        }

        let pages = rename_numbered_files(dir, &self.raw_page, converted_page_file_name)?;
        if pages.is_empty() {
            bail!(
                "pdftohtml produced no pages for {}",
                document.path.display()
            );
        }

        for leftover in [
            format!("{RAW_HTML_PREFIX}.html"),
            format!("{RAW_HTML_PREFIX}_ind.html"),
        ] {
            let path = dir.join(leftover);
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            }
        }

        // Written last: its presence means conversion completed.
        let links = pages
            .iter()
            .map(|page| {
                let name = converted_page_file_name(*page);
                format!("<li><a href=\"{name}\">{name}</a></li>")
            })
            .collect::<Vec<String>>()
            .join("\n");
        write_text(
            &dir.join(ROOT_MARKER),
            &format!(
                "<html><head><title>{}</title></head><body><ul>\n{links}\n</ul></body></html>\n",
                document.file_name
            ),
        )?;

        info!(document = %document.file_name, pages = pages.len(), "converted PDF to HTML");
        Ok(())
    }
}

#[derive(Debug)]
pub struct HtmlPageExtractor {
    page_name: Regex,
    text_box: Regex,
    inline_tag: Regex,
    raw_image: Regex,
}

impl HtmlPageExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            page_name: Regex::new(r"^page(\d+)\.html$")
                .context("failed to compile page name regex")?,
            text_box: Regex::new(
                r#"(?s)<p\s+style="position:absolute;top:(-?\d+(?:\.\d+)?)px;left:(-?\d+(?:\.\d+)?)px;[^"]*"[^>]*>(.*?)</p>"#,
            )
            .context("failed to compile text box regex")?,
            inline_tag: Regex::new(r"(?s)<[^>]+>").context("failed to compile inline tag regex")?,
            raw_image: raw_output_pattern(RAW_IMAGE_PREFIX, "png")?,
        })
    }

    pub fn parse_page_html(&self, page_num: u32, html: &str) -> PageData {
        let items = self
            .text_box
            .captures_iter(html)
            .filter_map(|captures| {
                let top = captures.get(1)?.as_str().parse::<f64>().ok()?;
                let left = captures.get(2)?.as_str().parse::<f64>().ok()?;
                let inner = captures.get(3)?.as_str().replace("<br/>", " ");
                let text = decode_entities(&self.inline_tag.replace_all(&inner, ""));
                let text = text.split_whitespace().collect::<Vec<&str>>().join(" ");
                if text.is_empty() {
                    return None;
                }
                Some(TextItem { top, left, text })
            })
            .collect();

        PageData { page_num, items }
    }

    fn page_number(&self, path: &Path) -> Option<u32> {
        let name = path.file_name()?.to_str()?;
        self.page_name
            .captures(name)?
            .get(1)?
            .as_str()
            .parse::<u32>()
            .ok()
    }
}

impl PageExtractor for HtmlPageExtractor {
    fn parse(&self, dir: &Path, filter: PageFilter) -> Result<PageDirectory> {
        let pattern = compile_pattern(&filter.html_glob())?;
        let mut pages = Vec::new();

        for path in matching_files(dir, &pattern)? {
            let Some(page_num) = self.page_number(&path) else {
                warn!(path = %path.display(), "skipping page file without page number");
                continue;
            };
            let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let html = String::from_utf8_lossy(&raw);
            pages.push(self.parse_page_html(page_num, &html));
        }

        debug!(dir = %dir.display(), pages = pages.len(), "parsed converted pages");
        Ok(PageDirectory::new(pages))
    }

    fn render(&self, document: &Document, filter: PageFilter) -> Result<()> {
        let dir = &document.working_dir;
        let mut command = Command::new("pdftoppm");
        command.arg("-png").arg("-r").arg("72");
        if let PageFilter::Page(page) = filter {
            command
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string());
        }
        command.arg(&document.path).arg(dir.join(RAW_IMAGE_PREFIX));

        let output = command.output().with_context(|| {
            format!("failed to execute pdftoppm for {}", document.path.display())
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftoppm returned non-zero exit status for {}: {}",
                document.path.display(),
                stderr.trim()
            );
        }

        let images = rename_numbered_files(dir, &self.raw_image, rendered_page_file_name)?;
        debug!(document = %document.file_name, images = images.len(), "rendered page images");
        Ok(())
    }
}

pub fn rename_numbered_files(
    dir: &Path,
    pattern: &Regex,
    target_name: fn(u32) -> String,
) -> Result<Vec<u32>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut pages = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let Some(page_num) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| pattern.captures(name))
            .and_then(|captures| captures.get(1))
            .and_then(|page| page.as_str().parse::<u32>().ok())
        else {
            continue;
        };

        let target = dir.join(target_name(page_num));
        fs::rename(&path, &target).with_context(|| {
            format!(
                "failed to rename {} to {}",
                path.display(),
                target.display()
            )
        })?;
        pages.push(page_num);
    }

    pages.sort_unstable();
    Ok(pages)
}

fn info_page(info: Option<&Value>, key: &str) -> Option<u64> {
    info?.get(key)?.as_u64().filter(|page| *page > 0)
}

fn decode_entities(text: &str) -> String {
    text.replace("&#160;", " ")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn collect_tool_versions() -> ToolVersions {
    ToolVersions {
        pdftohtml: command_version_optional("pdftohtml", &["-v"]),
        pdftoppm: command_version_optional("pdftoppm", &["-v"]),
    }
}

fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}
