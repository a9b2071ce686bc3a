//! Dispatch benchmarks for the relay.
//!
//! These benchmarks measure the synchronous path from event to rendered text.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relay_bench::{channel_name, message, protocols, rules_config, table};
use relay_core::{match_event, route, Dispatcher, Event, EventKind, RuleStore, RuleTable, Template};
use std::sync::Arc;

/// Benchmark template rendering.
fn bench_template(c: &mut Criterion) {
    let mut group = c.benchmark_group("template");

    let event = message(0);
    let short = Template::parse("<{USER}> {MESSAGE}");
    group.bench_function("short", |b| b.iter(|| short.render(black_box(&event))));

    let kick = Event::new(
        EventKind::Kick,
        "irc-esper",
        channel_name(0),
        relay_core::EndpointType::Channel,
        "Mallory",
    )
    .with_channel(channel_name(0))
    .with_kicker("Alice")
    .with_message("spam")
    .with_banned(true);
    let long = Template::parse("* {USER} was {BANNED?} from {CHANNEL} by {KICKER} ({MESSAGE})");
    group.bench_function("kick", |b| b.iter(|| long.render(black_box(&kick))));

    group.bench_function("parse", |b| {
        b.iter(|| Template::parse(black_box("[{PROTOCOL}] <{USER}> {MESSAGE} {UNKNOWN}")))
    });

    group.finish();
}

/// Benchmark rule matching as the table grows.
fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");

    for channels in [10, 100, 1000].iter() {
        let table = table(*channels, 1);
        let event = message(channels / 2);

        group.bench_with_input(BenchmarkId::new("indexed", channels), channels, |b, _| {
            b.iter(|| match_event(black_box(&event), &table))
        });

        group.bench_with_input(BenchmarkId::new("linear", channels), channels, |b, _| {
            b.iter(|| {
                table
                    .rules()
                    .iter()
                    .filter(|rule| rule.matches(black_box(&event)))
                    .count()
            })
        });
    }

    group.finish();
}

/// Benchmark fan-out to several destinations.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for fan_out in [1, 4, 16, 64].iter() {
        let table = table(10, *fan_out);
        let event = message(3);

        group.throughput(Throughput::Elements(*fan_out as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fan_out), fan_out, |b, _| {
            b.iter(|| route(&table, black_box(&event)))
        });
    }

    group.finish();
}

/// Benchmark dispatch through the shared store.
fn bench_dispatcher(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatcher");

    let dispatcher = Dispatcher::new(Arc::new(RuleStore::new(table(100, 2))));
    let event = message(42);
    group.bench_function("dispatch", |b| {
        b.iter(|| dispatcher.dispatch(black_box(&event)))
    });

    let miss = Event::channel_message("irc-esper", "#nowhere", "Alice", "hi");
    group.bench_function("no_match", |b| {
        b.iter(|| dispatcher.dispatch(black_box(&miss)))
    });

    group.finish();
}

/// Benchmark building a rule table from configuration.
fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    let protocols = protocols();

    for rules in [10, 100, 1000].iter() {
        let config = rules_config(*rules, 1);
        group.throughput(Throughput::Elements(*rules as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rules), rules, |b, _| {
            b.iter(|| RuleTable::load(black_box(&config), &protocols))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_template,
    bench_matching,
    bench_fanout,
    bench_dispatcher,
    bench_load,
);
criterion_main!(benches);
