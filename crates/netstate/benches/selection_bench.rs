//! Benchmarks for node address selection.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use netstate::{InterfaceAddress, NodeAddressSelector, Route, StaticInspector};
use std::net::IpAddr;

fn topology(links: u32) -> StaticInspector {
    let mut addresses = Vec::new();
    let mut routes = Vec::new();
    for link in 0..links {
        let v4: IpAddr = format!("10.{}.0.5", link).parse().unwrap();
        let v6: IpAddr = format!("fd00:{:x}::5", link).parse().unwrap();
        addresses.push(InterfaceAddress::new(link + 2, format!("eth{}", link), v4, 24));
        addresses.push(InterfaceAddress::new(link + 2, format!("eth{}", link), v6, 64));
        let gw: IpAddr = format!("10.{}.0.1", link).parse().unwrap();
        routes.push(Route::default_via(link + 2, gw, 100 + link % 2));
    }
    StaticInspector::new(addresses, routes)
}

fn bench_vip_directed(c: &mut Criterion) {
    let selector = NodeAddressSelector::new(topology(16));
    let vips: Vec<IpAddr> = vec!["10.15.0.100".parse().unwrap()];

    c.bench_function("select_vip_directed_16_links", |b| {
        b.iter(|| selector.select(black_box(&vips)).unwrap())
    });
}

fn bench_default_route(c: &mut Criterion) {
    let selector = NodeAddressSelector::new(topology(16));

    c.bench_function("select_default_route_16_links", |b| {
        b.iter(|| selector.select_default(black_box(false)).unwrap())
    });
}

criterion_group!(benches, bench_vip_directed, bench_default_route);
criterion_main!(benches);
