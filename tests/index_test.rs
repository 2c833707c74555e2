use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use tsindex::config::IndexConfig;
use tsindex::format::ts::synth::*;
use tsindex::format::ts::{
    find_and_parse_pat, find_and_parse_pmts, PacketBuf, Pcr, MAX_PCR, PID_PAT,
};
use tsindex::index::{
    analyze_pts_deltas, calculate_max_bitrates, estimate_bitrate_and_duration, index_file,
    index_files, StreamKind, StreamTiming, TimingSource,
};

const PMT_PID: u16 = 0x100;
const VIDEO_PID: u16 = 0x101;
const AUDIO_PID: u16 = 0x102;

/// 20 ms of PCR per video packet, 1920 ticks of PTS per audio packet.
const PCR_STEP: u64 = 540_000;
const PTS_STEP: u64 = 1920;

struct TempTs(PathBuf);

impl TempTs {
    fn new(name: &str, data: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!("tsindex-{}-{}.ts", std::process::id(), name));
        fs::write(&path, data).unwrap();
        TempTs(path)
    }
}

impl Drop for TempTs {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn tables() -> Vec<PacketBuf> {
    let mut packets = section_packets(PID_PAT, &pat_section(&[(1, PMT_PID)], 0, 0));
    packets.extend(section_packets(
        PMT_PID,
        &pmt_section(1, VIDEO_PID, &[(0x02, VIDEO_PID), (0x0F, AUDIO_PID)], 0, 0),
    ));
    packets
}

/// Two tables followed by `count` pairs of PCR-bearing video and audio PES packets.
fn program_stream(first_pcr: u64, count: u64) -> Vec<u8> {
    let mut packets = tables();
    for k in 0..count {
        let cc = k as u8;
        packets.push(pcr_payload_packet(
            VIDEO_PID,
            Pcr::from_ticks(first_pcr + k * PCR_STEP),
            false,
            cc,
            &[0u8; 100],
        ));
        packets.push(payload_packet(
            AUDIO_PID,
            true,
            cc,
            &pes_header(0xC0, Some(90_000 + k * PTS_STEP)),
        ));
    }
    flatten(&packets)
}

#[test]
fn test_index_single_program() {
    let file = TempTs::new("single", &program_stream(0, 50));
    let index = index_file(&file.0, &IndexConfig::default(), None).unwrap();

    let timing = index.timing.unwrap();
    assert_eq!(timing.source, TimingSource::Pcr);
    assert!((timing.duration_ms - 980.0).abs() < 1e-9);
    // First PCR packet starts at 376, last at 100 * 188.
    let expected_bitrate = ((100 * 188 - 376) * 8) as f64 / 0.98;
    assert!((timing.bitrate - expected_bitrate).abs() < 1e-6);

    assert!(index.pat_complete);
    assert_eq!(index.transport_stream_id, Some(1));
    assert!(index.missing_pmts.is_empty());
    assert_eq!(index.programs.len(), 1);

    let program = &index.programs[0];
    assert_eq!(program.program_number, 1);
    assert_eq!(program.pmt_pid, PMT_PID);
    assert_eq!(program.pcr_pid, VIDEO_PID);

    let streams = &program.streams;
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0].pid, VIDEO_PID);
    assert_eq!(streams[0].type_name, Some("MPEG-2 Video"));
    assert!(streams[0].carries_pcr);
    assert_eq!(streams[0].packet_count, Some(50));
    assert_eq!(streams[0].pts_cadence, None);

    assert_eq!(streams[1].pid, AUDIO_PID);
    assert_eq!(streams[1].type_name, Some("AAC"));
    assert_eq!(streams[1].kind, StreamKind::Elementary);
    let mean = streams[1].mean_bitrate.unwrap();
    assert!((mean - 50.0 * 1504.0 / 0.98).abs() < 1e-6);
    assert!(streams[1].max_bitrate.is_some());

    let cadence = streams[1].pts_cadence.unwrap();
    assert_eq!(cadence.min_delta, Some(PTS_STEP));
    assert!(cadence.is_constant);
    assert_eq!(cadence.pts_count, 49);
}

#[test]
fn test_estimators_on_file() {
    let file = TempTs::new("estimators", &program_stream(0, 50));

    let pat = find_and_parse_pat(&file.0).unwrap();
    assert_eq!(pat.programs.get(&PMT_PID), Some(&1));

    let pmts = find_and_parse_pmts(&file.0, pat.programs.keys().copied()).unwrap();
    assert_eq!(pmts.programs[&PMT_PID].pcr_pid, VIDEO_PID);

    let timing = estimate_bitrate_and_duration(&file.0, 1_000_000).unwrap().unwrap();
    let rates = calculate_max_bitrates(&file.0, timing.bitrate, 1.0).unwrap();
    assert_eq!(rates[&PID_PAT].packet_count, 1);
    assert_eq!(rates[&AUDIO_PID].packet_count, 50);

    let cadences = analyze_pts_deltas(&file.0, [AUDIO_PID, 0x1234]).unwrap();
    assert_eq!(cadences.len(), 1);
    assert!(cadences[&AUDIO_PID].is_constant);
}

#[test]
fn test_pcr_wrap_through_file() {
    let first = MAX_PCR - 10 * PCR_STEP;
    let file = TempTs::new("wrap", &program_stream(first, 50));
    let index = index_file(&file.0, &IndexConfig::default(), None).unwrap();

    let timing = index.timing.unwrap();
    assert!((timing.duration_ms - 980.0).abs() < 1e-6);
}

#[test]
fn test_short_file_gives_empty_index() {
    let file = TempTs::new("short", &[0x47; 100]);
    let index = index_file(&file.0, &IndexConfig::default(), None).unwrap();

    assert_eq!(index.timing, None);
    assert!(!index.pat_complete);
    assert!(index.programs.is_empty());
    assert!(index.missing_pmts.is_empty());
}

#[test]
fn test_timing_hint() {
    let file = TempTs::new("hint", &program_stream(0, 20));

    let hint = StreamTiming::hint(200_000.0, 2000.0);
    let index = index_file(&file.0, &IndexConfig::default(), Some(hint)).unwrap();
    assert_eq!(index.timing, Some(hint));

    // A zero hint falls back to the PCR measurement.
    let zero = StreamTiming::hint(0.0, 2000.0);
    let index = index_file(&file.0, &IndexConfig::default(), Some(zero)).unwrap();
    assert_eq!(index.timing.unwrap().source, TimingSource::Pcr);
}

#[test]
fn test_pcr_only_stream_and_missing_pmt() {
    let mut packets = section_packets(PID_PAT, &pat_section(&[(0, 0x10), (1, PMT_PID), (2, 0x200)], 0, 0));
    packets.extend(section_packets(PMT_PID, &pmt_section(1, 0x1FE, &[(0x1B, VIDEO_PID)], 0, 0)));
    for k in 0..10u64 {
        packets.push(pcr_packet(0x1FE, Pcr::from_ticks(k * PCR_STEP)));
        packets.push(payload_packet(VIDEO_PID, k == 0, k as u8, &[0u8; 184]));
    }
    let file = TempTs::new("pcr-only", &flatten(&packets));

    let index = index_file(&file.0, &IndexConfig::default(), None).unwrap();
    assert_eq!(index.network_pid, Some(0x10));
    assert_eq!(index.missing_pmts, vec![0x200]);

    let streams = &index.programs[0].streams;
    assert_eq!(streams[0].pid, 0x1FE);
    assert_eq!(streams[0].kind, StreamKind::PcrOnly);
    assert_eq!(streams[0].type_name, None);
    assert_eq!(streams[0].packet_count, Some(10));
    assert_eq!(streams[1].type_name, Some("H.264"));
}

#[test]
fn test_missing_pcr_still_indexes() {
    let mut packets = tables();
    for k in 0..5u8 {
        packets.push(payload_packet(AUDIO_PID, true, k, &pes_header(0xC0, Some(3000 * k as u64 + 3000))));
    }
    let file = TempTs::new("no-pcr", &flatten(&packets));

    let index = index_file(&file.0, &IndexConfig::default(), None).unwrap();
    assert_eq!(index.timing, None);
    let audio = &index.programs[0].streams[1];
    assert_eq!(audio.packet_count, None);
    assert_eq!(audio.mean_bitrate, None);
    assert_eq!(audio.pts_cadence.unwrap().min_delta, Some(3000));
}

#[test]
fn test_serialized_shape() {
    let file = TempTs::new("json", &program_stream(0, 10));
    let index = index_file(&file.0, &IndexConfig::default(), None).unwrap();

    let json = serde_json::to_value(&index).unwrap();
    assert_eq!(json["timing"]["source"], "pcr");
    assert_eq!(json["programs"][0]["streams"][1]["type_name"], "AAC");
    assert_eq!(json["programs"][0]["streams"][0]["kind"], "elementary");
    assert_eq!(json["network_pid"], serde_json::Value::Null);
}

#[test]
fn test_batch_keeps_input_order() {
    let a = TempTs::new("batch-a", &program_stream(0, 10));
    let b = TempTs::new("batch-b", &program_stream(0, 30));
    let paths = vec![
        b.0.clone(),
        PathBuf::from("/nonexistent/tsindex.ts"),
        a.0.clone(),
    ];
    let config = IndexConfig {
        max_parallel_scans: 2,
        ..IndexConfig::default()
    };

    let results = tokio_test::block_on(index_files(paths, config)).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().path, b.0);
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().path, a.0);
}
