mod common;

use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use pichi_core::filter::FilterExpr;
use pichi_core::{
    BloomFilter, ExtractOptions, FilterSet, IndexFormat, IndexMode, IndexOptions, IndexParser,
    IndexVersion, ParserOptions, Row, extract, index_pcaps,
};
use tempfile::TempDir;

use common::{icmp4, inputs, tcp4, udp6, write_pcap};

fn mixed_frames() -> Vec<Vec<u8>> {
    let v6a = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x0a];
    let v6b = [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x0b];
    vec![
        tcp4([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 64),
        tcp4([10, 0, 0, 2], [10, 0, 0, 1], 80, 1000, 200),
        udp6(v6a, v6b, 5353, 53),
        tcp4([192, 168, 7, 9], [8, 8, 8, 8], 40000, 443, 90),
        icmp4([10, 0, 0, 1], [192, 168, 7, 9]),
        udp6(v6b, v6a, 53, 5353),
        tcp4([172, 16, 4, 4], [10, 0, 0, 1], 22, 50000, 1514),
    ]
}

fn rows(index: &Path) -> Vec<Row> {
    let options = ParserOptions {
        load_to_memory: true,
        store: true,
    };
    let mut parser = IndexParser::open(index, options).unwrap();
    parser.parse_whole().unwrap();
    parser.take_stored_rows()
}

#[test]
fn rows_partition_each_capture() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.pcap");
    let b = temp.path().join("b.pcap");
    let a_bytes = write_pcap(&a, &mixed_frames());
    let b_bytes = write_pcap(&b, &mixed_frames()[2..5]);

    for version in [IndexVersion::V2, IndexVersion::V3] {
        let index = temp.path().join("both.pidx");
        let options = IndexOptions {
            version,
            ..IndexOptions::default()
        };
        index_pcaps(&inputs(&[&a, &b]), &index, &options).unwrap();

        let mut parser = IndexParser::open(&index, ParserOptions::default()).unwrap();
        let mut sections = 0;
        let mut total = 0;
        while let Some(file) = parser.next_file().unwrap() {
            sections += 1;
            let source = file.source().to_string();
            let original = if source == a.to_str().unwrap() { &a_bytes } else { &b_bytes };
            let mut rebuilt = original[..24].to_vec();
            let mut previous_stop = 24;
            for row in file {
                let row = row.unwrap();
                assert!(row.start() < row.stop());
                assert_eq!(row.start(), previous_stop);
                previous_stop = row.stop();
                let range = &original[row.start() as usize..row.stop() as usize];
                let caplen = u32::from_le_bytes(range[8..12].try_into().unwrap()) as usize;
                assert_eq!(range.len(), 16 + caplen);
                assert_eq!(row.bytes(), range.len() as u64);
                rebuilt.extend_from_slice(range);
                total += 1;
            }
            assert_eq!(&rebuilt, original);
        }
        let footer = parser.footer().unwrap();
        assert_eq!(u64::from(footer.files), sections);
        assert_eq!(u64::from(footer.packets), total);
        assert_eq!(total, 10);
    }
}

#[test]
fn extract_reindex_extract_is_stable() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    write_pcap(&pcap, &mixed_frames());
    let index = temp.path().join("a.pidx");
    index_pcaps(&inputs(&[&pcap]), &index, &IndexOptions::default()).unwrap();

    for filter in ["host==10.0.0.1", "port>=443", "eth_type==0x86dd", "l2_proto!=6"] {
        let first = temp.path().join("first.pcap");
        extract(&ExtractOptions {
            index: index.clone(),
            output: first.clone(),
            filter: Some(filter.to_string()),
            ..ExtractOptions::default()
        })
        .unwrap();

        let reindexed = temp.path().join("first.pidx");
        index_pcaps(&inputs(&[&first]), &reindexed, &IndexOptions::default()).unwrap();
        let second = temp.path().join("second.pcap");
        extract(&ExtractOptions {
            index: reindexed,
            output: second.clone(),
            ..ExtractOptions::default()
        })
        .unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap(), "{filter}");
    }
}

#[test]
fn text_and_binary_filters_agree_on_indexed_rows() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    write_pcap(&pcap, &mixed_frames());
    let binary = temp.path().join("a.pidx");
    let text = temp.path().join("a.ptxt");
    index_pcaps(&inputs(&[&pcap]), &binary, &IndexOptions::default()).unwrap();
    index_pcaps(
        &inputs(&[&pcap]),
        &text,
        &IndexOptions {
            format: IndexFormat::Text,
            ..IndexOptions::default()
        },
    )
    .unwrap();
    let binary_rows = rows(&binary);
    let text_rows = rows(&text);
    assert_eq!(binary_rows.len(), text_rows.len());

    let expressions = [
        "host==10.0.0.1",
        "host!=10.0.0.1",
        "src_host==10.0.0.0/8",
        "dst_host!=192.168.0.0/16",
        "host==2001:db8::a",
        "host==fe80::/10",
        "src_host<=10.0.0.2",
        "dst_host>=192.168.0.0",
        "port==53",
        "src_port<=1000",
        "dst_port>=443",
        "port!=80",
        "eth_type==2048",
        "eth_type!=0x86DD",
        "l2_proto==17",
        "l2_proto<=6",
    ];
    for expression in expressions {
        let text_filter = FilterSet::parse(expression, IndexFormat::Text).unwrap();
        let binary_filter = FilterSet::parse(expression, IndexFormat::Binary).unwrap();
        let from_text: Vec<bool> = text_rows.iter().map(|row| text_filter.matches(row)).collect();
        let from_binary: Vec<bool> = binary_rows
            .iter()
            .map(|row| binary_filter.matches(row))
            .collect();
        assert_eq!(from_text, from_binary, "{expression}");
    }
}

#[test]
fn cidr_matches_follow_subnet_containment() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    write_pcap(&pcap, &mixed_frames());
    let index = temp.path().join("a.pidx");
    index_pcaps(&inputs(&[&pcap]), &index, &IndexOptions::default()).unwrap();
    let rows = rows(&index);

    for network in ["10.0.0.0/8", "192.168.7.0/24", "2001:db8::/32", "0.0.0.0/0", "10.0.0.1/32"] {
        let parsed: ip_network::IpNetwork = network.parse().unwrap();
        let filters = FilterSet::parse(&format!("src_host=={network}"), IndexFormat::Binary).unwrap();
        for row in &rows {
            let src = row.to_record().unwrap().src_host;
            assert_eq!(filters.matches(row), parsed.contains(src), "{network} {src}");
        }
    }
}

#[test]
fn bloom_sidecar_has_no_false_negatives() {
    let temp = TempDir::new().unwrap();
    let pcap = temp.path().join("a.pcap");
    write_pcap(&pcap, &mixed_frames());
    let index = temp.path().join("a.pidx");
    let report = index_pcaps(
        &inputs(&[&pcap]),
        &index,
        &IndexOptions {
            bloom: true,
            ..IndexOptions::default()
        },
    )
    .unwrap();
    let bloom = BloomFilter::read_from(report.artifacts[0].bloom.as_ref().unwrap()).unwrap();

    let hosts: HashSet<IpAddr> = rows(&index)
        .iter()
        .map(|row| row.to_record().unwrap())
        .flat_map(|record| [record.src_host, record.dst_host])
        .collect();
    assert_eq!(hosts.len(), 7);
    for host in &hosts {
        assert!(bloom.contains_addr(host), "{host}");
    }
}

#[test]
fn individual_mode_writes_one_index_per_capture() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.pcap");
    let b = temp.path().join("b.pcap");
    write_pcap(&a, &mixed_frames());
    write_pcap(&b, &mixed_frames()[..2]);
    let out = temp.path().join("indexes");
    let report = index_pcaps(
        &inputs(&[&a, &b]),
        &out,
        &IndexOptions {
            mode: IndexMode::Individual,
            ..IndexOptions::default()
        },
    )
    .unwrap();
    let paths: Vec<_> = report.artifacts.iter().map(|artifact| artifact.path.clone()).collect();
    assert_eq!(paths, vec![out.join("a.pcap.pidx"), out.join("b.pcap.pidx")]);

    let mut parser = IndexParser::open(&paths[1], ParserOptions::default()).unwrap();
    let summary = parser.parse_whole().unwrap();
    assert_eq!(summary.name.as_deref(), Some("b.pcap"));
    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.packets_total, 2);
    assert!(summary.created_at.is_some());
}

#[test]
fn parsed_filters_display_back_to_their_source() {
    for atom in ["host==10.0.0.1", "dst_port>=1024", "src_host!=10.0.0.0/8"] {
        let expr: FilterExpr = atom.parse().unwrap();
        assert_eq!(expr.to_string(), atom);
    }
}
