use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kit_data_merger::{classify, parse_lineage, Channel, KitTaxa, SampleType};

fn kit_with_taxa(count: usize) -> KitTaxa {
    let mut kit = KitTaxa::default();
    for i in 0..count {
        let key = format!("id__T{i};Kingdom__Fungi;Philum__P{};Class__C{}", i % 7, i % 13);
        for (n, channel) in Channel::ALL.iter().enumerate() {
            kit.record(key.clone(), *channel, ((i * 31 + n * 7) % 97) as f64);
        }
    }
    kit
}

fn bench_merger(c: &mut Criterion) {
    let names = ["S12_F_run3.csv", "s99_fr_extra.txt", "S7_L.csv", "readme.txt"];
    c.bench_function("classify", |b| {
        b.iter(|| {
            for name in names {
                black_box(classify(black_box(name)));
            }
        })
    });

    let kit = kit_with_taxa(5_000);
    c.bench_function("normalize_5000_taxa", |b| b.iter(|| black_box(kit.normalized())));

    c.bench_function("parse_lineage", |b| {
        b.iter(|| {
            parse_lineage(
                SampleType::Fungi,
                black_box("id__T1;Kingdom__Fungi;Philum__Ascomycota;Class__Eurotiomycetes;Order__Eurotiales;Family__Aspergillaceae;Genus__Aspergillus;Species__Aspergillus_niger"),
            )
        })
    });
}

criterion_group!(benches, bench_merger);
criterion_main!(benches);
