//! File-level passes: CoNLL-U normalization followed by enrichment.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use corpusmill::models::Compression;
use corpusmill::services::{
    verify_doc_counts, ConlluNormalizer, EnrichOptions, Enricher, MwtLayout, RefPolicy,
};
use corpusmill::utils::compress::open_reader;
use corpusmill::utils::FanOut;
use corpusmill::Error;

fn conllu(doc_id: &str) -> String {
    format!(
        "# newdoc id = {doc_id}\n\
         # sent_id = 9\n\
         1\tHola\thola\tINTJ\t_\t_\t0\troot\t_\t_\n\
         \n\
         # sent_id = 12\n\
         1-2\tdel\t_\t_\t_\t_\t_\t_\t_\t_\n\
         1\tde\tde\tADP\t_\t_\t3\tcase\t_\t_\n\
         2\tel\tel\tDET\t_\t_\t3\tdet\t_\t_\n\
         3\tmar\tmar\tNOUN\t_\t_\t0\troot\t_\t_\n\
         \n"
    )
}

#[tokio::test]
async fn normalize_then_enrich_in_generation_order() {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> = [10, 2, 1]
        .iter()
        .map(|n| {
            let path = dir.path().join(format!("corpus.{}.conllu", n));
            fs::write(&path, conllu(&format!("d{}", n))).unwrap();
            path
        })
        .collect();

    let outcomes = ConlluNormalizer::new(MwtLayout::SplicedBeforeMembers)
        .normalize_files(inputs.clone(), &FanOut::new(2, Duration::from_secs(30)))
        .await;
    let mut verticals = Vec::new();
    for (input, outcome) in inputs.iter().zip(outcomes) {
        let (output, report) = outcome.result.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.multiword, 1);
        assert_eq!(verify_doc_counts(input, &output).unwrap(), (1, 1));
        verticals.push(output);
    }
    assert_eq!(verticals[0], dir.path().join("corpus.10.vert"));

    fs::write(
        dir.path().join("corpus.2.vert.lid.tsv"),
        "index\tlang\n1\tes\n",
    )
    .unwrap();

    let mut enricher = Enricher::new(
        RefPolicy::sequential(100),
        RefPolicy::sequential(0),
        EnrichOptions {
            compress: Some(Compression::Xz),
            keep: false,
            langid: true,
        },
    );
    let reports = enricher.run(&verticals).unwrap();
    let order: Vec<String> = reports
        .iter()
        .map(|r| r.output.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(order, ["corpus.1.vert.xz", "corpus.2.vert.xz", "corpus.10.vert.xz"]);

    let mut text = String::new();
    open_reader(&dir.path().join("corpus.2.vert.xz"))
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "<docx ref=\"2\" name=\"corpus.2.vert\">");
    assert_eq!(lines[1], "<doc id=\"d2\" ref=\"102\">");
    assert_eq!(lines[2], "<s id=\"0\" lang=\"es\">");
    assert!(lines.contains(&"1,2\tdel\tde,el\tADP,DET\t_\t_\t3\tcase,det\t_\t_"));
    assert!(lines.contains(&"<s id=\"1\">"));
    assert_eq!(lines.last(), Some(&"</docx>"));

    assert!(!dir.path().join("corpus.2.vert").exists());
}

#[test]
fn enrich_rejects_names_without_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.vert");
    fs::write(&path, "<doc id=\"a\">\n</doc>\n").unwrap();

    let mut enricher = Enricher::new(
        RefPolicy::sequential(0),
        RefPolicy::sequential(0),
        EnrichOptions::default(),
    );
    let err = enricher.run(&[path.clone()]).unwrap_err();
    assert!(matches!(err, Error::FileName(_)));
    assert_eq!(fs::read_to_string(&path).unwrap(), "<doc id=\"a\">\n</doc>\n");
}
