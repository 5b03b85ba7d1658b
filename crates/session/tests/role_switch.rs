mod support;

use learnhub_auth::Role;
use learnhub_session::{BackendError, SessionStatus, SwitchError, SwitchOutcome, SwitchRoleResponse};

use support::{Harness, fresh_pair, snapshot, wait_until};

fn confirmed(role: Role) -> Result<SwitchRoleResponse, BackendError> {
    Ok(SwitchRoleResponse { active_role: role })
}

#[tokio::test]
async fn switch_to_unassigned_role_is_rejected_before_any_request() {
    let h = Harness::signed_in(&["student", "tutor"]).await;

    assert_eq!(
        h.machine.switch_role(Role::Guardian).await,
        Err(SwitchError::NotAssigned(Role::Guardian))
    );
    assert_eq!(h.backend.switch.calls(), 0);
    assert_eq!(h.machine.identity().unwrap().active_role(), Role::Tutor);
    assert_eq!(h.machine.last_switch_error(), Some(SwitchError::NotAssigned(Role::Guardian)));
}

#[tokio::test]
async fn confirmed_switch_replaces_active_role_and_clears_error() {
    let h = Harness::signed_in(&["student", "tutor"]).await;
    h.backend.switch.push(Err(BackendError::Transport("offline".into())));
    assert_eq!(h.machine.switch_role(Role::Student).await, Err(SwitchError::Unreachable));

    h.backend.switch.push(confirmed(Role::Student));
    assert_eq!(
        h.machine.switch_role(Role::Student).await,
        Ok(SwitchOutcome::Switched {
            from: Role::Tutor,
            to: Role::Student
        })
    );

    let identity = h.machine.identity().unwrap();
    assert_eq!(identity.active_role(), Role::Student);
    assert_eq!(identity.assigned_roles(), &[Role::Student, Role::Tutor]);
    assert_eq!(h.machine.last_switch_error(), None);
}

#[tokio::test]
async fn failed_switch_leaves_identity_untouched() {
    let h = Harness::signed_in(&["student", "tutor"]).await;
    let before = h.machine.identity().unwrap();
    h.backend
        .switch
        .push(Err(BackendError::Rejected {
            message: "role suspended".into(),
        }));

    assert_eq!(
        h.machine.switch_role(Role::Student).await,
        Err(SwitchError::Rejected("role suspended".into()))
    );

    let after = h.machine.identity().unwrap();
    assert_eq!(*after, *before);
    assert_eq!(after.active_role(), Role::Tutor);
    assert_eq!(h.machine.switch_in_flight(), None);
    assert!(h.machine.last_switch_error().is_some());
}

#[tokio::test]
async fn second_switch_while_pending_is_rejected() {
    let h = Harness::signed_in(&["student", "tutor"]).await;
    let reply = h.backend.switch.hold();

    let machine = h.machine.clone();
    let first = tokio::spawn(async move { machine.switch_role(Role::Student).await });
    wait_until(|| h.backend.switch.calls() == 1).await;

    assert_eq!(h.machine.switch_in_flight(), Some(Role::Student));
    assert_eq!(
        h.machine.switch_role(Role::Tutor).await,
        Err(SwitchError::InFlight { pending: Role::Student })
    );
    assert_eq!(h.machine.identity().unwrap().active_role(), Role::Tutor);

    reply.send(confirmed(Role::Student)).unwrap();

    assert_eq!(
        first.await.unwrap(),
        Ok(SwitchOutcome::Switched {
            from: Role::Tutor,
            to: Role::Student
        })
    );
    assert_eq!(h.machine.identity().unwrap().active_role(), Role::Student);
    assert_eq!(h.backend.switch.calls(), 1);
}

#[tokio::test]
async fn switching_to_active_role_is_a_local_no_op() {
    let h = Harness::signed_in(&["student", "tutor"]).await;

    assert_eq!(h.machine.switch_role(Role::Tutor).await, Ok(SwitchOutcome::Unchanged(Role::Tutor)));
    assert_eq!(h.backend.switch.calls(), 0);
}

#[tokio::test]
async fn confirmation_of_a_different_role_is_a_failure() {
    let h = Harness::signed_in(&["student", "tutor", "guardian"]).await;
    h.backend.switch.push(confirmed(Role::Guardian));

    assert_eq!(
        h.machine.switch_role(Role::Student).await,
        Err(SwitchError::Mismatch {
            requested: Role::Student,
            confirmed: Role::Guardian
        })
    );
    assert_eq!(h.machine.identity().unwrap().active_role(), Role::Tutor);
}

#[tokio::test]
async fn confirmation_after_logout_is_discarded() {
    let h = Harness::signed_in(&["student", "tutor"]).await;
    let reply = h.backend.switch.hold();
    h.backend.logout.push(Ok(()));

    let machine = h.machine.clone();
    let pending = tokio::spawn(async move { machine.switch_role(Role::Student).await });
    wait_until(|| h.backend.switch.calls() == 1).await;

    h.machine.logout().await;
    reply.send(confirmed(Role::Student)).unwrap();

    assert_eq!(pending.await.unwrap(), Err(SwitchError::Stale));
    assert_eq!(h.machine.status(), SessionStatus::Unauthenticated);
    assert!(h.machine.identity().is_none());
    assert_eq!(h.machine.last_switch_error(), None);
}

#[tokio::test]
async fn permission_reload_during_switch_keeps_the_switch_alive() {
    let h = Harness::signed_in(&["student", "tutor"]).await;
    let reply = h.backend.switch.hold();

    let machine = h.machine.clone();
    let pending = tokio::spawn(async move { machine.switch_role(Role::Student).await });
    wait_until(|| h.backend.switch.calls() == 1).await;

    h.backend.identity.push(Ok(snapshot(&["student", "tutor", "guardian"])));
    h.machine.reload_identity().await.unwrap();
    reply.send(confirmed(Role::Student)).unwrap();

    assert!(pending.await.unwrap().is_ok());
    let identity = h.machine.identity().unwrap();
    assert_eq!(identity.active_role(), Role::Student);
    assert!(identity.has_role(Role::Guardian));
}

#[tokio::test]
async fn switch_requires_a_session() {
    let h = Harness::signed_out().await;

    assert_eq!(h.machine.switch_role(Role::Student).await, Err(SwitchError::NotAuthenticated));
}

#[tokio::test]
async fn refresh_during_switch_follows_the_server_active_role() {
    let h = Harness::signed_in(&["student", "tutor"]).await;
    let reply = h.backend.switch.hold();

    let machine = h.machine.clone();
    let pending = tokio::spawn(async move { machine.switch_role(Role::Student).await });
    wait_until(|| h.backend.switch.calls() == 1).await;

    let mut server = snapshot(&["student", "tutor"]);
    server.active_role = Some("student".into());
    h.backend.refresh.push(Ok(fresh_pair("rotated")));
    h.backend.identity.push(Ok(server));
    h.machine.refresh_session().await.unwrap();
    reply.send(confirmed(Role::Student)).unwrap();

    assert_eq!(pending.await.unwrap(), Err(SwitchError::Stale));
    assert_eq!(h.machine.identity().unwrap().active_role(), Role::Student);
    assert_eq!(h.machine.switch_in_flight(), None);
}
