use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures::executor::block_on;
use hostconnect_bridge::cache::KvStore;
use hostconnect_bridge::{AvailabilityDecoder, CalendarDate, MemoryStore, ResponseParser};
use rand::{seq::SliceRandom, thread_rng, Rng};
use std::fmt::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn allotment(days: usize) -> String {
    let mut rng = thread_rng();
    let values = [-3, -2, -1, 0, 1, 2, 4, 8];
    (0..days)
        .map(|_| values.choose(&mut rng).copied().unwrap_or(0).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn option_info_reply(options: usize, days: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?><Reply><OptionInfoReply>");
    for n in 0..options {
        let _ = write!(
            xml,
            "<Option><Opt>CPTDTBENCH{n:04}</Opt><OptGeneral><Description>Bench product {n}</Description>\
             <ClassDescription>Standard</ClassDescription><Periods>1</Periods></OptGeneral>\
             <OptAvail>{}</OptAvail><OptDateRanges><OptDateRange><DateFrom>2025-01-01</DateFrom>\
             <DateTo>2025-12-31</DateTo><Currency>AUD</Currency><RateSets><RateSet>\
             <RateName>Standard</RateName><AppliesDaysOfWeek Mon=\"Y\" Tues=\"Y\" Weds=\"Y\" Thurs=\"Y\" Fri=\"Y\" Sat=\"N\" Sun=\"N\"/>\
             <OptRate><RoomRates><TwinRate>150000</TwinRate></RoomRates></OptRate></RateSet></RateSets>\
             </OptDateRange></OptDateRanges><OptStayResults><Currency>AUD</Currency>\
             <TotalPrice>150000</TotalPrice></OptStayResults></Option>",
            allotment(days)
        );
    }
    xml.push_str("</OptionInfoReply></Reply>");
    xml
}

pub fn decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("availability_decode");
    let parser = ResponseParser::new();
    let decoder = AvailabilityDecoder::default();
    let from = CalendarDate::from_ymd(2025, 1, 1).unwrap();

    for days in [31usize, 90, 365].iter() {
        let xml = option_info_reply(1, *days);
        group.bench_with_input(BenchmarkId::from_parameter(days), &xml, |b, xml| {
            b.iter(|| {
                let products = parser.parse_options(black_box(xml)).unwrap();
                decoder.decode(&products[0], from).unwrap()
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("search_reply_parse");
    for options in [10usize, 100].iter() {
        let xml = option_info_reply(*options, 14);
        group.bench_with_input(BenchmarkId::from_parameter(options), &xml, |b, xml| {
            b.iter(|| parser.parse_options(black_box(xml)).unwrap().len());
        });
    }
    group.finish();
}

pub fn store_benchmark(c: &mut Criterion) {
    c.bench_function("memory_store_concurrent", |b| {
        b.iter(|| {
            let store = Arc::new(MemoryStore::with_max_entries(200));
            let keys = (0..300).map(|i| format!("search:{i:064x}")).collect::<Vec<_>>();
            let payload = Bytes::from(vec![7u8; 2048]);

            // Mixed reads and writes from several threads
            let mut handles = vec![];
            for _ in 0..4 {
                let store = Arc::clone(&store);
                let keys = keys.clone();
                let payload = payload.clone();
                handles.push(thread::spawn(move || {
                    let mut rng = thread_rng();
                    for _ in 0..250 {
                        let key = keys.choose(&mut rng).unwrap();
                        if rng.gen_bool(0.3) {
                            block_on(store.set(key, payload.clone(), Duration::from_secs(300)))
                                .unwrap();
                        } else {
                            let _ = block_on(store.get(key));
                        }
                    }
                }));
            }
            for handle in handles {
                handle.join().unwrap();
            }
            store.len()
        });
    });
}

criterion_group!(benches, decode_benchmark, store_benchmark);
criterion_main!(benches);
