//! Resolver and authorization check benchmarks
//!
//! Cached resolution is the hot path; uncached resolution bounds the cost
//! of a miss after invalidation.

use console_authz::store::{GraphSnapshot, InMemoryGraphStore};
use console_authz::types::{ApiEndpoint, Menu, Principal, Role};
use console_authz::{Authorizer, PermissionCache, PermissionResolver, TreeBuilder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// One user holding `roles` roles, each granting a slice of a shared graph
fn build_graph(roles: i64) -> GraphSnapshot {
    let mut graph = GraphSnapshot::new();

    for section in 0..20 {
        let catalog = section * 100;
        graph = graph.with_menu(Menu::catalog(catalog, format!("Section {}", section)));
        for page in 1..=5 {
            let page_id = catalog + page * 10;
            graph = graph.with_menu(Menu::page(page_id, format!("Page {}", page)).with_parent(catalog));
            for button in 1..=3 {
                graph = graph.with_menu(
                    Menu::button(page_id + button, "Action", format!("s{}:p{}:b{}", section, page, button))
                        .with_parent(page_id),
                );
            }
        }
    }

    for api in 0..400 {
        graph = graph.with_api(
            ApiEndpoint::new(api, "GET", format!("/s{}/r{}/{{id}}", api / 20, api % 20))
                .with_permission_code(format!("api:{}", api)),
        );
    }

    for role in 0..roles {
        graph = graph.with_role(Role::new(role, format!("role-{}", role))).assign_role(1, role);
        for section in (role..20).step_by(roles as usize) {
            for id in [0, 10, 11, 12, 20, 21] {
                graph = graph.grant_menu(role, section * 100 + id);
            }
            for api in 0..20 {
                graph = graph.grant_api(role, section * 20 + api);
            }
        }
    }

    graph
}

fn resolver_for(roles: i64) -> PermissionResolver {
    PermissionResolver::new(
        Arc::new(InMemoryGraphStore::from_snapshot(build_graph(roles))),
        Arc::new(PermissionCache::in_memory(10_000, Duration::from_secs(300))),
    )
}

fn bench_resolve(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let principal = Principal::new(1);

    let mut group = c.benchmark_group("resolve");

    for roles in [1i64, 4, 10] {
        let resolver = resolver_for(roles);

        group.bench_with_input(BenchmarkId::new("uncached", roles), &roles, |b, _| {
            b.iter(|| rt.block_on(async { black_box(resolver.resolve_uncached(&principal).await.unwrap()) }))
        });

        rt.block_on(resolver.resolve(&principal)).unwrap();
        group.bench_with_input(BenchmarkId::new("cached", roles), &roles, |b, _| {
            b.iter(|| rt.block_on(async { black_box(resolver.resolve(&principal).await.unwrap()) }))
        });
    }

    group.finish();
}

fn bench_authorize(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let authorizer = Authorizer::new(Arc::new(resolver_for(4)));
    let principal = Principal::new(1);

    // Warm catalog and bundle
    rt.block_on(authorizer.authorize(&principal, "GET", "/s0/r0/1"));

    c.bench_function("authorize_cached", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(authorizer.authorize(&principal, "GET", black_box("/s3/r7/42")).await)
            })
        })
    });

    c.bench_function("authorize_unknown_endpoint", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(authorizer.authorize(&principal, "GET", black_box("/nowhere/at/all")).await)
            })
        })
    });
}

fn bench_tree_build(c: &mut Criterion) {
    let menus = build_graph(1).menus;
    let builder = TreeBuilder::new();

    c.bench_function("tree_build_420_nodes", |b| {
        b.iter(|| black_box(builder.build(menus.clone())))
    });
}

criterion_group!(benches, bench_resolve, bench_authorize, bench_tree_build);
criterion_main!(benches);
