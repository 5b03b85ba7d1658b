use std::collections::BTreeMap;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use learnhub_auth::{Identity, IdentitySnapshot, KNOWN_PERMISSIONS, Permission, Requirement, Role, decide};
use learnhub_core::{ResourceId, UserId};

fn identity_with_flags(flag_count: usize) -> Identity {
    let mut permissions = BTreeMap::new();
    for i in 0..flag_count {
        permissions.insert(format!("can_feature_{i}"), i % 2 == 0);
    }
    permissions.insert("can_access_tutor_dashboard".to_string(), true);

    let snapshot = IdentitySnapshot {
        id: UserId::new("bench-user").unwrap(),
        email: "bench@example.com".to_string(),
        profile: serde_json::Value::Null,
        roles: vec!["student".to_string(), "tutor".to_string(), "guardian".to_string()],
        active_role: None,
        permissions,
        qualified_resources: (0..32).map(|i| ResourceId::new(format!("course-{i}")).unwrap()).collect(),
    };
    Identity::materialize(snapshot, None).unwrap()
}

fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("access_gate_decide");

    for flags in [8usize, 64, 512] {
        let identity = identity_with_flags(flags);
        let dashboard = Requirement::dashboard(Role::Tutor);
        let wide = Requirement::authenticated()
            .with_roles([Role::Admin, Role::Tutor])
            .with_permissions(KNOWN_PERMISSIONS.iter().cloned().chain([Permission::CAN_EXPORT]));

        group.bench_with_input(BenchmarkId::new("dashboard", flags), &identity, |b, identity| {
            b.iter(|| decide(black_box(Some(identity)), black_box(&dashboard)))
        });
        group.bench_with_input(BenchmarkId::new("wide_requirement", flags), &identity, |b, identity| {
            b.iter(|| decide(black_box(Some(identity)), black_box(&wide)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decide);
criterion_main!(benches);
