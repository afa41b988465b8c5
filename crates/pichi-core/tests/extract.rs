mod common;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use pichi_core::{
    ExtractOptions, FormatError, IndexFormat, IndexOptions, IndexParser, IndexVersion,
    IndexWriter, ParserOptions, PichiError, Row, dump_rows, extract, index_pcaps, index_stream,
};
use tempfile::TempDir;

use common::{icmp4, inputs, read_frames, tcp4, write_pcap};

fn index_binary(dir: &Path, pcaps: &[&Path]) -> PathBuf {
    let index = dir.join("capture.pidx");
    index_pcaps(&inputs(pcaps), &index, &IndexOptions::default()).unwrap();
    index
}

fn extract_to(index: &Path, output: &Path, filter: Option<&str>) -> pichi_core::ExtractReport {
    extract(&ExtractOptions {
        index: index.to_path_buf(),
        output: output.to_path_buf(),
        filter: filter.map(str::to_string),
        ..ExtractOptions::default()
    })
    .unwrap()
}

fn base_frames() -> Vec<Vec<u8>> {
    vec![
        tcp4([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 64),
        tcp4([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 128),
        tcp4([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 64),
    ]
}

#[test]
fn identity_extraction_reproduces_the_capture() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    let original = write_pcap(&pcap, &base_frames());
    let index = index_binary(temp.path(), &[&pcap]);

    let output = temp.path().join("out.pcap");
    let report = extract_to(&index, &output, None);
    assert_eq!(report.packets, 3);
    assert_eq!(report.bytes, original.len() as u64 - 24);
    assert_eq!(report.output.as_deref(), Some(output.as_path()));
    assert_eq!(fs::read(&output).unwrap(), original);
}

#[test]
fn host_filter_selects_one_conversation() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    let mut frames = base_frames();
    frames.push(tcp4([10, 0, 0, 3], [10, 0, 0, 4], 1000, 80, 64));
    write_pcap(&pcap, &frames);
    let index = index_binary(temp.path(), &[&pcap]);

    let output = temp.path().join("out.pcap");
    let report = extract_to(&index, &output, Some("host==10.0.0.1"));
    assert_eq!(report.packets, 3);
    assert_eq!(read_frames(&output), frames[..3].to_vec());
}

#[test]
fn cidr_filter_selects_the_network() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    let frames = vec![
        tcp4([192, 168, 1, 5], [10, 9, 9, 9], 1000, 80, 64),
        tcp4([192, 168, 2, 7], [10, 9, 9, 9], 1000, 80, 64),
        tcp4([10, 0, 0, 1], [192, 168, 1, 1], 1000, 80, 64),
    ];
    write_pcap(&pcap, &frames);
    let index = index_binary(temp.path(), &[&pcap]);

    let output = temp.path().join("out.pcap");
    extract_to(&index, &output, Some("src_host==192.168.0.0/16"));
    assert_eq!(read_frames(&output), frames[..2].to_vec());
}

#[test]
fn port_conjunction() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    let frames = vec![
        tcp4([10, 0, 0, 1], [10, 0, 0, 2], 40000, 80, 64),
        tcp4([10, 0, 0, 1], [10, 0, 0, 2], 40001, 443, 64),
        tcp4([10, 0, 0, 1], [10, 0, 0, 2], 40002, 22, 64),
        tcp4([10, 0, 0, 2], [10, 0, 0, 1], 80, 40000, 70),
    ];
    write_pcap(&pcap, &frames);
    let index = index_binary(temp.path(), &[&pcap]);

    let output = temp.path().join("out.pcap");
    let report = extract_to(&index, &output, Some("port==80 port!=443"));
    assert_eq!(report.packets, 2);
    assert_eq!(read_frames(&output), vec![frames[0].clone(), frames[3].clone()]);
}

#[test]
fn icmp_rows_have_zero_ports() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    let frames = vec![
        tcp4([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 64),
        icmp4([10, 0, 0, 1], [10, 0, 0, 2]),
    ];
    write_pcap(&pcap, &frames);
    let index = index_binary(temp.path(), &[&pcap]);

    let mut parser = IndexParser::open(&index, ParserOptions::default()).unwrap();
    let file = parser.next_file().unwrap().unwrap();
    let rows: Vec<Row> = file.collect::<Result<_, _>>().unwrap();
    let icmp = rows[1].to_record().unwrap();
    assert_eq!(icmp.l2_proto, 1);
    assert_eq!((icmp.src_port, icmp.dst_port), (0, 0));

    let output = temp.path().join("out.pcap");
    let report = extract_to(&index, &output, Some("l2_proto==1"));
    assert_eq!(report.packets, 1);
    assert_eq!(read_frames(&output), vec![frames[1].clone()]);

    let report = extract_to(&index, &temp.path().join("named.pcap"), Some("l2_proto==icmp"));
    assert_eq!(report.packets, 1);
}

#[test]
fn footer_off_by_one_is_rejected() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    write_pcap(&pcap, &base_frames());
    let index = index_binary(temp.path(), &[&pcap]);

    let mut bytes = fs::read(&index).unwrap();
    let len = bytes.len();
    bytes[len - 4] -= 1;
    fs::write(&index, bytes).unwrap();

    let mut parser = IndexParser::open(&index, ParserOptions::default()).unwrap();
    let err = parser.parse_whole().unwrap_err();
    assert!(matches!(
        err,
        FormatError::FooterMismatch {
            field: "packet count",
            expected: 2,
            actual: 3
        }
    ));
}

#[test]
fn no_match_creates_no_output() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    write_pcap(&pcap, &base_frames());
    let index = index_binary(temp.path(), &[&pcap]);

    let output = temp.path().join("out.pcap");
    let report = extract_to(&index, &output, Some("dst_port==9999"));
    assert_eq!(report.packets, 0);
    assert_eq!(report.output, None);
    assert!(!output.exists());
}

#[test]
fn filter_errors_come_before_any_io() {
    let temp = TempDir::new().unwrap();
    let err = extract(&ExtractOptions {
        index: temp.path().join("missing.pidx"),
        output: temp.path().join("out.pcap"),
        filter: Some("src_host>=10.0.0.0/8".to_string()),
        ..ExtractOptions::default()
    })
    .unwrap_err();
    assert!(matches!(err, PichiError::Filter(_)));

    let err = extract(&ExtractOptions {
        index: temp.path().join("missing.pidx"),
        output: temp.path().join("out.pcap"),
        ..ExtractOptions::default()
    })
    .unwrap_err();
    assert!(matches!(err, PichiError::Io { .. }));
}

#[test]
fn sections_are_extracted_in_order_and_missing_sources_skipped() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.pcap");
    let b = temp.path().join("b.pcap");
    let c = temp.path().join("c.pcap");
    let a_frames = base_frames();
    let b_frames = vec![tcp4([10, 0, 0, 5], [10, 0, 0, 6], 5000, 53, 80)];
    let c_frames = vec![tcp4([10, 0, 0, 7], [10, 0, 0, 8], 7000, 22, 90)];
    write_pcap(&a, &a_frames);
    write_pcap(&b, &b_frames);
    write_pcap(&c, &c_frames);
    let index = index_binary(temp.path(), &[&a, &b, &c]);
    fs::remove_file(&b).unwrap();

    let output = temp.path().join("out.pcap");
    let report = extract_to(&index, &output, None);
    assert_eq!(report.files_visited, 3);
    assert_eq!(report.files_skipped, 1);
    let mut expected = a_frames;
    expected.extend(c_frames);
    assert_eq!(read_frames(&output), expected);
}

#[test]
fn truncated_source_is_fatal_and_output_removed() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    let original = write_pcap(&pcap, &base_frames());
    let index = index_binary(temp.path(), &[&pcap]);
    fs::write(&pcap, &original[..original.len() - 10]).unwrap();

    let output = temp.path().join("out.pcap");
    let err = extract(&ExtractOptions {
        index: index.clone(),
        output: output.clone(),
        ..ExtractOptions::default()
    })
    .unwrap_err();
    assert!(matches!(
        err,
        PichiError::Format(FormatError::SourceTruncated { .. })
    ));
    assert!(!output.exists());
}

#[test]
fn compressed_index_source_and_output() {
    let temp = TempDir::new().unwrap();
    let plain = temp.path().join("a.pcap");
    let original = write_pcap(&plain, &base_frames());
    let gz = temp.path().join("a.pcap.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&original).unwrap();
    fs::write(&gz, encoder.finish().unwrap()).unwrap();

    let options = IndexOptions {
        compress: true,
        ..IndexOptions::default()
    };
    let report = index_pcaps(&inputs(&[&gz]), &temp.path().join("a.pidx"), &options).unwrap();
    let index = &report.artifacts[0].path;
    assert_eq!(index, &temp.path().join("a.pidx.gz"));

    let output = temp.path().join("out.pcap");
    let report = extract(&ExtractOptions {
        index: index.clone(),
        output: output.clone(),
        filter: Some("dst_port==80".to_string()),
        compress: true,
        ..ExtractOptions::default()
    })
    .unwrap();
    assert_eq!(report.packets, 3);
    let written = temp.path().join("out.pcap.gz");
    assert_eq!(report.output.as_deref(), Some(written.as_path()));

    let mut decoder = flate2::read::GzDecoder::new(fs::File::open(&written).unwrap());
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut decoder, &mut bytes).unwrap();
    assert_eq!(bytes, original);
}

#[test]
fn prefix_relocates_relative_source_names() {
    let temp = TempDir::new().unwrap();
    let captures = temp.path().join("captures");
    fs::create_dir(&captures).unwrap();
    let pcap = captures.join("a.pcap");
    let original = write_pcap(&pcap, &base_frames());

    let index = temp.path().join("relative.pidx");
    let mut writer = IndexWriter::new(
        fs::File::create(&index).unwrap(),
        IndexFormat::Binary,
        IndexVersion::V2,
        "relative",
        0,
    )
    .unwrap();
    index_stream("a.pcap", fs::File::open(&pcap).unwrap(), &mut writer, None).unwrap();
    writer.finish().unwrap();

    let output = temp.path().join("out.pcap");
    let report = extract(&ExtractOptions {
        index: index.clone(),
        output: output.clone(),
        prefix: Some(captures),
        ..ExtractOptions::default()
    })
    .unwrap();
    assert_eq!(report.packets, 3);
    assert_eq!(fs::read(&output).unwrap(), original);
}

#[test]
fn text_and_binary_indexes_extract_the_same_packets() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    let mut frames = base_frames();
    frames.push(tcp4([172, 16, 0, 1], [10, 0, 0, 2], 2000, 443, 100));
    frames.push(icmp4([10, 0, 0, 9], [172, 16, 0, 1]));
    write_pcap(&pcap, &frames);

    let binary = index_binary(temp.path(), &[&pcap]);
    let text = temp.path().join("capture.ptxt");
    let options = IndexOptions {
        format: IndexFormat::Text,
        ..IndexOptions::default()
    };
    index_pcaps(&inputs(&[&pcap]), &text, &options).unwrap();

    for filter in ["host==172.16.0.1", "dst_port>=443", "l2_proto!=6", "src_host==10.0.0.0/8"] {
        let from_binary = temp.path().join("from_binary.pcap");
        let from_text = temp.path().join("from_text.pcap");
        extract_to(&binary, &from_binary, Some(filter));
        extract_to(&text, &from_text, Some(filter));
        assert_eq!(
            fs::read(&from_binary).unwrap(),
            fs::read(&from_text).unwrap(),
            "{filter}"
        );
        fs::remove_file(&from_binary).unwrap();
        fs::remove_file(&from_text).unwrap();
    }
}

#[test]
fn bloom_sidecar_short_circuits_absent_hosts() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    write_pcap(&pcap, &base_frames());
    let options = IndexOptions {
        bloom: true,
        bloom_fp_rate: 0.000_1,
        ..IndexOptions::default()
    };
    let index = temp.path().join("capture.pidx");
    let report = index_pcaps(&inputs(&[&pcap]), &index, &options).unwrap();
    let bloom = report.artifacts[0].bloom.clone().unwrap();
    assert_eq!(bloom, temp.path().join("capture.pidx.bloom"));

    let output = temp.path().join("out.pcap");
    let absent = extract(&ExtractOptions {
        index: index.clone(),
        output: output.clone(),
        filter: Some("src_host==192.0.2.77".to_string()),
        bloom: Some(bloom.clone()),
        ..ExtractOptions::default()
    })
    .unwrap();
    assert!(absent.bloom_rejected);
    assert_eq!(absent.packets, 0);
    assert!(!output.exists());

    let present = extract(&ExtractOptions {
        index,
        output: output.clone(),
        filter: Some("src_host==10.0.0.1".to_string()),
        bloom: Some(bloom),
        ..ExtractOptions::default()
    })
    .unwrap();
    assert!(!present.bloom_rejected);
    assert_eq!(present.packets, 3);
}

#[test]
fn bloom_sidecar_agrees_with_plain_extraction_on_unknown_frames() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    let mut lldp = vec![0x01, 0x80, 0xc2, 0, 0, 0x0e, 0x02, 0, 0, 0, 0, 1, 0x88, 0xcc];
    lldp.extend_from_slice(&[0x02, 0x07, 0x04, 0, 0, 0, 0, 0, 1]);
    write_pcap(&pcap, &[tcp4([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 64), lldp]);
    let index = temp.path().join("capture.pidx");
    let report = index_pcaps(
        &inputs(&[&pcap]),
        &index,
        &IndexOptions {
            bloom: true,
            ..IndexOptions::default()
        },
    )
    .unwrap();
    let bloom = report.artifacts[0].bloom.clone().unwrap();

    let plain = extract_to(&index, &temp.path().join("plain.pcap"), Some("host==0.0.0.0"));
    let with_bloom = extract(&ExtractOptions {
        index,
        output: temp.path().join("bloom.pcap"),
        filter: Some("host==0.0.0.0".to_string()),
        bloom: Some(bloom),
        ..ExtractOptions::default()
    })
    .unwrap();
    assert_eq!(plain.packets, 1);
    assert!(!with_bloom.bloom_rejected);
    assert_eq!(with_bloom.packets, plain.packets);
}

#[test]
fn dump_prints_matching_rows_as_text_lines() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    write_pcap(
        &pcap,
        &[
            tcp4([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 64),
            icmp4([10, 0, 0, 9], [10, 0, 0, 1]),
        ],
    );
    let index = index_binary(temp.path(), &[&pcap]);

    let mut out = Vec::new();
    let rows = dump_rows(&index, Some("l2_proto==1"), &mut out).unwrap();
    assert_eq!(rows, 1);
    let text = String::from_utf8(out).unwrap();
    let line = text.strip_suffix('\n').unwrap();
    let fields: Vec<&str> = line.split('|').collect();
    assert_eq!(fields[1], pcap.to_str().unwrap());
    assert_eq!(fields[2], "104");
    assert_eq!(&fields[4..], ["2048", "1", "10.0.0.9", "10.0.0.1", "0", "0"]);

    let mut all = Vec::new();
    assert_eq!(dump_rows(&index, None, &mut all).unwrap(), 2);
}
