//! Normalize path: CoNLL-U-like annotator output to vertical text.
//!
//! `# newdoc` opens a `<doc`, the `# key = value` lines after it become its
//! attributes, `# sent_id` opens a sentence (ids restart at 0 per document),
//! numeric lines are tokens and a blank line closes the sentence. Multi-word
//! token ranges (`3-4`) are spliced into a single line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::utils::compress::open_reader;
use crate::utils::xml::{escape_attr, open_tag_name};
use crate::utils::{FanOut, PartitionOutcome};

static MWT_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)(?:\t|$)").unwrap());
static METADATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*(\S+)\s*=\s*(.*)$").unwrap());

/// Where member lines of a multi-word token go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MwtLayout {
    /// Spliced line first, then the member lines unchanged.
    #[default]
    SplicedBeforeMembers,
    /// Only the spliced line; members are not written.
    SplicedOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConlluReport {
    pub documents: usize,
    pub sentences: usize,
    pub tokens: usize,
    pub multiword: usize,
}

/// Splice a multi-word group (`[range line, member lines...]`) into one line.
///
/// Member columns that agree collapse to one value, others are comma-joined
/// in member order. The form and the last column come from the range line.
pub fn splice_mwt(group: &[Vec<String>]) -> String {
    let Some(range) = group.first() else {
        return String::new();
    };
    let members = &group[1..];
    if members.is_empty() {
        return range.join("\t");
    }

    let width = members.iter().map(Vec::len).max().unwrap_or(0);
    let mut columns: Vec<String> = (0..width)
        .map(|c| {
            let values: Vec<&str> = members
                .iter()
                .map(|m| m.get(c).map(String::as_str).unwrap_or("_"))
                .collect();
            if values.iter().all(|v| *v == values[0]) {
                values[0].to_string()
            } else {
                values.join(",")
            }
        })
        .collect();

    if let (Some(form), Some(slot)) = (range.get(1), columns.get_mut(1)) {
        *slot = form.clone();
    }
    if let (Some(last), Some(slot)) = (range.last(), columns.last_mut()) {
        if width > 1 {
            *slot = last.clone();
        }
    }
    columns.join("\t")
}

struct MwtGroup {
    end: u64,
    lines: Vec<Vec<String>>,
    raw_members: Vec<String>,
}

/// Streaming converter state.
struct Converter<W: Write> {
    out: W,
    layout: MwtLayout,
    in_doc: bool,
    /// `<doc` written, attributes still being collected.
    header_open: bool,
    in_sentence: bool,
    next_sentence: usize,
    mwt: Option<MwtGroup>,
    report: ConlluReport,
}

fn split_columns(line: &str) -> Vec<String> {
    line.split('\t').map(|c| c.trim().to_string()).collect()
}

impl<W: Write> Converter<W> {
    fn new(out: W, layout: MwtLayout) -> Self {
        Self {
            out,
            layout,
            in_doc: false,
            header_open: false,
            in_sentence: false,
            next_sentence: 0,
            mwt: None,
            report: ConlluReport::default(),
        }
    }

    fn close_header(&mut self) -> Result<()> {
        if self.header_open {
            self.out.write_all(b">\n")?;
            self.header_open = false;
        }
        Ok(())
    }

    fn flush_mwt(&mut self) -> Result<()> {
        let Some(group) = self.mwt.take() else {
            return Ok(());
        };
        writeln!(self.out, "{}", splice_mwt(&group.lines))?;
        self.report.multiword += 1;
        match self.layout {
            MwtLayout::SplicedBeforeMembers => {
                for member in &group.raw_members {
                    writeln!(self.out, "{}", member)?;
                }
                self.report.tokens += group.raw_members.len();
            }
            MwtLayout::SplicedOnly => self.report.tokens += 1,
        }
        Ok(())
    }

    fn close_sentence(&mut self) -> Result<()> {
        self.flush_mwt()?;
        if self.in_sentence {
            self.out.write_all(b"</s>\n")?;
            self.in_sentence = false;
        }
        Ok(())
    }

    fn close_document(&mut self) -> Result<()> {
        self.close_sentence()?;
        self.close_header()?;
        if self.in_doc {
            self.out.write_all(b"</doc>\n")?;
            self.in_doc = false;
        }
        Ok(())
    }

    fn open_document(&mut self) -> Result<()> {
        self.out.write_all(b"<doc")?;
        self.in_doc = true;
        self.header_open = true;
        self.next_sentence = 0;
        self.report.documents += 1;
        Ok(())
    }

    fn open_sentence(&mut self, line_no: usize) -> Result<()> {
        self.close_sentence()?;
        if !self.in_doc {
            warn!(line = line_no, "Sentence outside a document, opening one");
            self.open_document()?;
        }
        self.close_header()?;
        writeln!(self.out, "<s id=\"{}\">", self.next_sentence)?;
        self.next_sentence += 1;
        self.in_sentence = true;
        self.report.sentences += 1;
        Ok(())
    }

    fn write_attr(&mut self, key: &str, value: &str) -> Result<()> {
        write!(self.out, " {}=\"{}\"", key, escape_attr(value.trim()))?;
        Ok(())
    }

    fn token(&mut self, line: &str, line_no: usize) -> Result<()> {
        if !self.in_sentence {
            self.open_sentence(line_no)?;
        }

        if let Some(caps) = MWT_RANGE.captures(line) {
            self.flush_mwt()?;
            let start: u64 = caps[1].parse().unwrap_or(0);
            let end: u64 = caps[2].parse().unwrap_or(0);
            if end < start {
                return Err(Error::Conllu {
                    line: line_no,
                    message: format!("inverted token range {}-{}", start, end),
                });
            }
            self.mwt = Some(MwtGroup {
                end,
                lines: vec![split_columns(line)],
                raw_members: Vec::new(),
            });
            return Ok(());
        }

        let index: Option<u64> = line
            .split('\t')
            .next()
            .and_then(|c| c.parse().ok());

        if let (Some(group), Some(idx)) = (self.mwt.as_mut(), index) {
            if idx <= group.end {
                group.lines.push(split_columns(line));
                group.raw_members.push(line.to_string());
                if idx == group.end {
                    self.flush_mwt()?;
                }
                return Ok(());
            }
        }

        self.flush_mwt()?;
        writeln!(self.out, "{}", line)?;
        self.report.tokens += 1;
        Ok(())
    }

    fn line(&mut self, raw: &str, line_no: usize) -> Result<()> {
        let line = raw.trim_end_matches(['\n', '\r']);

        if line.starts_with("# newdoc") {
            self.close_document()?;
            self.open_document()?;
            if let Some((key, value)) = line["# newdoc".len()..].split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    self.write_attr(key, value)?;
                }
            }
        } else if line.starts_with("# sent_id") {
            self.open_sentence(line_no)?;
        } else if line.starts_with("# text") {
            // raw sentence text is not kept
        } else if line.starts_with('#') {
            match METADATA.captures(line) {
                Some(caps) if self.header_open => self.write_attr(&caps[1], &caps[2])?,
                _ => debug!(line = line_no, "Ignoring comment {:?}", line),
            }
        } else if line.starts_with(|c: char| c.is_ascii_digit()) {
            self.token(line, line_no)?;
        } else if line.trim().is_empty() {
            self.close_sentence()?;
        } else {
            return Err(Error::Conllu {
                line: line_no,
                message: format!("unexpected line {:?}", line),
            });
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(W, ConlluReport)> {
        self.close_document()?;
        self.out.flush()?;
        Ok((self.out, self.report))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConlluNormalizer {
    layout: MwtLayout,
}

impl ConlluNormalizer {
    pub fn new(layout: MwtLayout) -> Self {
        Self { layout }
    }

    pub fn normalize<R: BufRead, W: Write>(&self, input: R, out: W) -> Result<ConlluReport> {
        let mut converter = Converter::new(out, self.layout);
        for (i, line) in input.lines().enumerate() {
            converter.line(&line?, i + 1)?;
        }
        let (_, report) = converter.finish()?;
        Ok(report)
    }

    pub fn normalize_str(&self, input: &str) -> Result<String> {
        let mut out = Vec::new();
        self.normalize(input.as_bytes(), &mut out)?;
        String::from_utf8(out).map_err(|e| Error::Verify(e.to_string()))
    }

    /// Convert `path` to a sibling `.vert` file, written atomically.
    pub fn normalize_file(&self, path: &Path) -> Result<(PathBuf, ConlluReport)> {
        let dest = vertical_path(path);
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let tmp = NamedTempFile::new_in(dir)?;
        let report = {
            let writer = BufWriter::new(tmp.as_file());
            self.normalize(open_reader(path)?, writer)?
        };
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| e.error)?;

        info!(
            file = %path.display(),
            documents = report.documents,
            sentences = report.sentences,
            "Normalized CoNLL-U"
        );
        Ok((dest, report))
    }

    /// Normalize several files concurrently, one file per worker.
    pub async fn normalize_files(
        &self,
        paths: Vec<PathBuf>,
        fanout: &FanOut,
    ) -> Vec<PartitionOutcome<(PathBuf, ConlluReport)>> {
        let normalizer = self.clone();
        let partitions = paths
            .into_iter()
            .map(|p| (p.display().to_string(), p))
            .collect();
        fanout
            .run(partitions, move |path: PathBuf| normalizer.normalize_file(&path))
            .await
    }
}

/// `x.conllu` becomes `x.vert`; other names get `.vert` appended.
pub fn vertical_path(path: &Path) -> PathBuf {
    let plain = crate::utils::compress::strip_compression(path);
    match plain.extension().and_then(|e| e.to_str()) {
        Some("conllu") | Some("conll") => plain.with_extension("vert"),
        _ => {
            let mut name = plain.into_os_string();
            name.push(".vert");
            PathBuf::from(name)
        }
    }
}

/// Check that `output` has as many `<doc` lines as `input` has `# newdoc`.
pub fn verify_doc_counts(input: &Path, output: &Path) -> Result<(usize, usize)> {
    let count = |path: &Path, prefix: &str| -> Result<usize> {
        let mut n = 0;
        for line in open_reader(path)?.lines() {
            let line = line?;
            if line.starts_with(prefix) {
                n += 1;
            }
        }
        Ok(n)
    };

    let expected = count(input, "# newdoc")?;
    let found = {
        let reader = BufReader::new(File::open(output)?);
        let mut n = 0;
        for line in reader.lines() {
            let line = line?;
            if open_tag_name(&line) == Some("doc") {
                n += 1;
            }
        }
        n
    };

    if expected != found {
        return Err(Error::Verify(format!(
            "{}: {} documents in input, {} in {}",
            input.display(),
            expected,
            found,
            output.display()
        )));
    }
    Ok((expected, found))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(line: &str) -> Vec<String> {
        split_columns(line)
    }

    #[test]
    fn test_splice_collapses_and_joins() {
        let group = vec![
            cols("3-4\tdel\t_\t_\t_\t_\t_\t_\t_\tSpaceAfter=No"),
            cols("3\tde\tde\tADP\tSP\t_\t5\tcase\t_\t_"),
            cols("4\tel\tel\tDET\tDA\t_\t5\tdet\t_\t_"),
        ];
        let spliced = splice_mwt(&group);
        assert_eq!(
            spliced,
            "3,4\tdel\tde,el\tADP,DET\tSP,DA\t_\t5\tcase,det\t_\tSpaceAfter=No"
        );
    }

    #[test]
    fn test_splice_identical_columns() {
        let group = vec![
            cols("1-2\tvámonos\t_\t_\t_"),
            cols("1\tvamos\tir\tX\t_"),
            cols("2\tnos\tnosotros\tX\t_"),
        ];
        assert_eq!(splice_mwt(&group), "1,2\tvámonos\tir,nosotros\tX\t_");
    }

    const SAMPLE: &str = "# newdoc id = d1
# source = web & co
# sent_id = 17
# text = Vamos al mar.
1\tVamos\tir\tVERB\t_\t_\t0\troot\t_\t_
2-3\tal\t_\t_\t_\t_\t_\t_\t_\t_
2\ta\ta\tADP\t_\t_\t4\tcase\t_\t_
3\tel\tel\tDET\t_\t_\t4\tdet\t_\t_
4\tmar\tmar\tNOUN\t_\t_\t1\tobl\t_\tSpaceAfter=No
5\t.\t.\tPUNCT\t_\t_\t1\tpunct\t_\t_

# sent_id = 40
1\tSí\tsí\tINTJ\t_\t_\t0\troot\t_\t_

# newdoc id = d2
# sent_id = 3
1\tNo\tno\tADV\t_\t_\t0\troot\t_\t_
";

    #[test]
    fn test_normalize_document_structure() {
        let out = ConlluNormalizer::default().normalize_str(SAMPLE).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "<doc id=\"d1\" source=\"web &amp; co\">");
        assert_eq!(lines[1], "<s id=\"0\">");
        assert_eq!(lines[3], "2,3\tal\ta,el\tADP,DET\t_\t_\t4\tcase,det\t_\t_");
        assert_eq!(lines[4], "2\ta\ta\tADP\t_\t_\t4\tcase\t_\t_");
        assert!(out.contains("</s>\n<s id=\"1\">\n1\tSí"));
        assert!(out.contains("</doc>\n<doc id=\"d2\">\n<s id=\"0\">\n"));
        assert!(out.ends_with("</s>\n</doc>\n"));
    }

    #[test]
    fn test_spliced_only_layout() {
        let out = ConlluNormalizer::new(MwtLayout::SplicedOnly)
            .normalize_str(SAMPLE)
            .unwrap();
        assert!(out.contains("2,3\tal\ta,el"));
        assert!(!out.contains("\n2\ta\ta\tADP"));
        assert!(out.contains("\n4\tmar\t"));
    }

    #[test]
    fn test_sentence_ids_are_dense_per_document() {
        let out = ConlluNormalizer::default().normalize_str(SAMPLE).unwrap();
        let ids: Vec<&str> = out
            .lines()
            .filter(|l| l.starts_with("<s id="))
            .collect();
        assert_eq!(ids, ["<s id=\"0\">", "<s id=\"1\">", "<s id=\"0\">"]);
    }

    #[test]
    fn test_report_counts() {
        let mut out = Vec::new();
        let report = ConlluNormalizer::default()
            .normalize(SAMPLE.as_bytes(), &mut out)
            .unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.sentences, 3);
        assert_eq!(report.multiword, 1);
        // 1, 2, 3, 4, 5 + 1 + 1
        assert_eq!(report.tokens, 7);
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let err = ConlluNormalizer::default()
            .normalize_str("# newdoc\n# sent_id = 1\nword\tNN\n")
            .unwrap_err();
        assert!(matches!(err, Error::Conllu { line: 3, .. }));
    }

    #[test]
    fn test_implicit_document_and_sentence() {
        let out = ConlluNormalizer::default()
            .normalize_str("1\tHi\thi\tINTJ\n")
            .unwrap();
        assert_eq!(out, "<doc>\n<s id=\"0\">\n1\tHi\thi\tINTJ\n</s>\n</doc>\n");
    }

    #[test]
    fn test_group_at_end_of_input_is_flushed() {
        let out = ConlluNormalizer::new(MwtLayout::SplicedOnly)
            .normalize_str("# newdoc\n# sent_id = 1\n1-2\tdel\t_\t_\n1\tde\tde\t_\n")
            .unwrap();
        assert_eq!(out, "<doc>\n<s id=\"0\">\n1\tdel\tde\t_\n</s>\n</doc>\n");
    }

    #[test]
    fn test_normalize_file_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("part.conllu");
        std::fs::write(&input, SAMPLE).unwrap();

        let normalizer = ConlluNormalizer::default();
        let (dest, report) = normalizer.normalize_file(&input).unwrap();
        assert_eq!(dest, dir.path().join("part.vert"));
        assert_eq!(report.documents, 2);
        assert_eq!(verify_doc_counts(&input, &dest).unwrap(), (2, 2));

        std::fs::write(&dest, "<doc id=\"d1\">\n</doc>\n").unwrap();
        assert!(matches!(
            verify_doc_counts(&input, &dest),
            Err(Error::Verify(_))
        ));
    }

    #[tokio::test]
    async fn test_normalize_files_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| {
                let p = dir.path().join(format!("f{}.conllu", i));
                std::fs::write(&p, SAMPLE).unwrap();
                p
            })
            .collect();

        let fanout = FanOut::new(2, std::time::Duration::from_secs(30));
        let outcomes = ConlluNormalizer::default()
            .normalize_files(paths, &fanout)
            .await;
        assert_eq!(outcomes.len(), 3);
        for outcome in outcomes {
            let (dest, report) = outcome.result.unwrap();
            assert!(dest.exists());
            assert_eq!(report.documents, 2);
        }
    }
}
