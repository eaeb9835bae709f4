use std::collections::HashSet;
use std::fmt;

use crate::acl::types::{Action, Actor, Role};

/// Ownership check evaluated when a rule's role and action match.
///
/// The resource is `None` for checks that have no instance yet (`Create`,
/// `List`); predicates decide what that means for them.
pub type Predicate<R> = Box<dyn Fn(Option<&R>, &Actor) -> bool + Send + Sync>;

/// A grant of one or more actions to a role, optionally narrowed by a predicate.
pub struct Rule<R> {
    role: Role,
    actions: HashSet<Action>,
    predicate: Option<Predicate<R>>,
}

impl<R> Rule<R> {
    fn new(role: Role, actions: &[Action], predicate: Option<Predicate<R>>) -> Self {
        assert!(!actions.is_empty(), "ACL rule for {role} grants no actions");
        Self {
            role,
            actions: actions.iter().copied().collect(),
            predicate,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn actions(&self) -> &HashSet<Action> {
        &self.actions
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Whether this rule covers `action`, either directly or through `Manage`.
    pub fn permits(&self, action: Action) -> bool {
        self.actions.contains(&action) || self.actions.contains(&Action::Manage)
    }

    fn grants(&self, actor: &Actor, action: Action, resource: Option<&R>) -> bool {
        if !self.permits(action) {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(resource, actor),
            None => true,
        }
    }
}

impl<R> fmt::Debug for Rule<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.actions.iter().map(|a| a.to_string()).collect();
        actions.sort();
        f.debug_struct("Rule")
            .field("role", &self.role)
            .field("actions", &actions)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Collects rules during startup. Consumed by [`AclBuilder::build`], after
/// which the rule set can no longer change.
pub struct AclBuilder<R> {
    rules: Vec<Rule<R>>,
}

impl<R> Default for AclBuilder<R> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<R> AclBuilder<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally grant `actions` to `role`.
    ///
    /// # Panics
    ///
    /// If `actions` is empty, in every build profile.
    pub fn allow(mut self, role: Role, actions: &[Action]) -> Self {
        self.rules.push(Rule::new(role, actions, None));
        self
    }

    /// Grant `actions` to `role` only when `predicate(resource, actor)` holds.
    pub fn allow_if<F>(mut self, role: Role, actions: &[Action], predicate: F) -> Self
    where
        F: Fn(Option<&R>, &Actor) -> bool + Send + Sync + 'static,
    {
        self.rules
            .push(Rule::new(role, actions, Some(Box::new(predicate))));
        self
    }

    pub fn build(self) -> Acl<R> {
        Acl { rules: self.rules }
    }
}

/// Immutable access-control rules for one resource domain.
///
/// Evaluation never mutates the rules, so a single instance can be shared
/// across request handlers behind an `Arc`.
pub struct Acl<R> {
    rules: Vec<Rule<R>>,
}

impl<R> Acl<R> {
    pub fn builder() -> AclBuilder<R> {
        AclBuilder::new()
    }

    pub fn rules(&self) -> &[Rule<R>] {
        &self.rules
    }

    /// Decide whether `actor` may perform `action`, optionally on `resource`.
    ///
    /// Roles are tried in the actor's order and rules in registration order;
    /// the first granting rule wins. Denial is the default: an actor without
    /// roles, or with no matching rule, is never authorized.
    pub fn authorize(&self, actor: &Actor, action: Action, resource: Option<&R>) -> bool {
        actor.roles.iter().any(|role| {
            self.rules
                .iter()
                .filter(|rule| rule.role == *role)
                .any(|rule| rule.grants(actor, action, resource))
        })
    }

    /// Bind the rules to one actor.
    pub fn for_actor<'a>(&'a self, actor: &'a Actor) -> ActorAcl<'a, R> {
        ActorAcl { acl: self, actor }
    }
}

impl<R> fmt::Debug for Acl<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acl").field("rules", &self.rules).finish()
    }
}

/// An [`Acl`] view bound to a single actor.
pub struct ActorAcl<'a, R> {
    acl: &'a Acl<R>,
    actor: &'a Actor,
}

impl<R> ActorAcl<'_, R> {
    pub fn can_do(&self, action: Action, resource: Option<&R>) -> bool {
        self.acl.authorize(self.actor, action, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Doc {
        owner_id: i32,
    }

    fn owner_only(doc: Option<&Doc>, actor: &Actor) -> bool {
        doc.is_some_and(|d| d.owner_id == actor.id)
    }

    fn user(id: i32) -> Actor {
        Actor::new(id, "foo", vec![Role::User])
    }

    fn admin(id: i32) -> Actor {
        Actor::new(id, "admin", vec![Role::Admin])
    }

    fn scenario_acl() -> Acl<Doc> {
        Acl::builder()
            .allow(Role::Admin, &[Action::Manage])
            .allow(Role::User, &[Action::Read])
            .allow_if(Role::User, &[Action::Update, Action::Delete], owner_only)
            .build()
    }

    #[test]
    #[should_panic(expected = "grants no actions")]
    fn test_rule_without_actions_rejected() {
        let _ = Acl::<Doc>::builder().allow(Role::User, &[]);
    }

    #[test]
    #[should_panic(expected = "grants no actions")]
    fn test_conditional_rule_without_actions_rejected() {
        let _ = Acl::<Doc>::builder().allow_if(Role::User, &[], owner_only);
    }

    #[test]
    fn test_builder_registers_rules_in_order() {
        let acl = scenario_acl();
        let rules = acl.rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].role(), Role::Admin);
        assert!(rules[0].actions().contains(&Action::Manage));
        assert!(!rules[0].has_predicate());
        assert_eq!(rules[1].role(), Role::User);
        assert!(rules[2].has_predicate());
        assert_eq!(rules[2].actions().len(), 2);
    }

    #[test]
    fn test_empty_roles_always_denied() {
        let acl = scenario_acl();
        let nobody = Actor::new(1, "nobody", vec![]);
        let doc = Doc { owner_id: 1 };
        for action in Action::CONCRETE.iter().chain([Action::Manage].iter()) {
            assert!(!acl.authorize(&nobody, *action, Some(&doc)));
            assert!(!acl.authorize(&nobody, *action, None));
        }
    }

    #[test]
    fn test_no_rule_for_role_denies() {
        let acl: Acl<Doc> = Acl::builder().allow(Role::User, &[Action::Read]).build();
        assert!(!acl.authorize(&admin(7), Action::Read, None));
    }

    #[test]
    fn test_no_rule_for_action_denies() {
        let acl: Acl<Doc> = Acl::builder().allow(Role::User, &[Action::Read]).build();
        assert!(!acl.authorize(&user(6), Action::Create, None));
    }

    #[test]
    fn test_unconditional_read() {
        let acl: Acl<Doc> = Acl::builder().allow(Role::User, &[Action::Read]).build();
        let actor = user(6);
        assert!(acl.authorize(&actor, Action::Read, None));
        assert!(acl.authorize(&actor, Action::Read, Some(&Doc { owner_id: 99 })));
        assert!(!acl.authorize(&actor, Action::Update, None));
    }

    #[test]
    fn test_manage_implies_every_action() {
        let acl: Acl<Doc> = Acl::builder().allow(Role::Admin, &[Action::Manage]).build();
        let actor = admin(7);
        for action in Action::CONCRETE {
            assert!(acl.authorize(&actor, action, None), "{action} denied");
            assert!(acl.authorize(&actor, action, Some(&Doc { owner_id: 1 })));
        }
    }

    #[test]
    fn test_manage_with_predicate_follows_predicate() {
        let always: Acl<Doc> = Acl::builder()
            .allow_if(Role::User, &[Action::Manage], |_, _| true)
            .build();
        assert!(always.authorize(&user(6), Action::Read, None));

        let never: Acl<Doc> = Acl::builder()
            .allow_if(Role::User, &[Action::Manage], |_, _| false)
            .build();
        assert!(!never.authorize(&user(6), Action::Read, None));
    }

    #[test]
    fn test_predicate_tracks_ownership() {
        let acl: Acl<Doc> = Acl::builder()
            .allow_if(Role::User, &[Action::Update], owner_only)
            .build();
        let actor = user(1);
        let mut doc = Doc { owner_id: 1 };
        assert!(acl.authorize(&actor, Action::Update, Some(&doc)));
        doc.owner_id = 2;
        assert!(!acl.authorize(&actor, Action::Update, Some(&doc)));
    }

    #[test]
    fn test_predicate_receives_missing_resource() {
        let seen_none = Arc::new(AtomicUsize::new(0));
        let counter = seen_none.clone();
        let acl: Acl<Doc> = Acl::builder()
            .allow_if(Role::User, &[Action::List], move |doc, _| {
                if doc.is_none() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                true
            })
            .build();
        assert!(acl.authorize(&user(1), Action::List, None));
        assert_eq!(seen_none.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rules_for_same_role_are_independent() {
        let acl: Acl<Doc> = Acl::builder()
            .allow(Role::User, &[Action::Read])
            .allow_if(Role::User, &[Action::Update], owner_only)
            .build();
        let actor = user(1);
        let foreign = Doc { owner_id: 2 };
        let own = Doc { owner_id: 1 };
        assert!(acl.authorize(&actor, Action::Read, Some(&foreign)));
        assert!(acl.authorize(&actor, Action::Read, Some(&own)));
        assert!(!acl.authorize(&actor, Action::Update, Some(&foreign)));
        assert!(acl.authorize(&actor, Action::Update, Some(&own)));
    }

    #[test]
    fn test_failed_predicate_does_not_stop_search() {
        let acl: Acl<Doc> = Acl::builder()
            .allow_if(Role::User, &[Action::Delete], |_, _| false)
            .allow(Role::User, &[Action::Delete])
            .build();
        assert!(acl.authorize(&user(1), Action::Delete, None));
    }

    #[test]
    fn test_second_role_can_grant() {
        let acl: Acl<Doc> = Acl::builder().allow(Role::Admin, &[Action::Delete]).build();
        let actor = Actor::new(3, "both", vec![Role::User, Role::Admin]);
        assert!(acl.authorize(&actor, Action::Delete, None));
    }

    #[test]
    fn test_first_grant_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let acl: Acl<Doc> = Acl::builder()
            .allow(Role::User, &[Action::Read])
            .allow_if(Role::User, &[Action::Read], move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .build();
        assert!(acl.authorize(&user(1), Action::Read, None));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rule_order_does_not_change_result() {
        let forward: Acl<Doc> = Acl::builder()
            .allow_if(Role::User, &[Action::Update], owner_only)
            .allow(Role::User, &[Action::Read])
            .build();
        let reversed: Acl<Doc> = Acl::builder()
            .allow(Role::User, &[Action::Read])
            .allow_if(Role::User, &[Action::Update], owner_only)
            .build();
        let actor = user(1);
        for doc in [Doc { owner_id: 1 }, Doc { owner_id: 2 }] {
            for action in Action::CONCRETE {
                assert_eq!(
                    forward.authorize(&actor, action, Some(&doc)),
                    reversed.authorize(&actor, action, Some(&doc))
                );
            }
        }
    }

    #[test]
    fn test_concrete_scenario() {
        let acl = scenario_acl();
        let actor = user(1);
        let owned = Doc { owner_id: 1 };
        let foreign = Doc { owner_id: 2 };

        assert!(acl.authorize(&actor, Action::Update, Some(&owned)));
        assert!(!acl.authorize(&actor, Action::Update, Some(&foreign)));
        assert!(acl.authorize(&actor, Action::Read, Some(&owned)));
        assert!(acl.authorize(&actor, Action::Read, Some(&foreign)));
        assert!(acl.authorize(&admin(1), Action::Delete, Some(&foreign)));
    }

    #[test]
    fn test_for_actor_matches_authorize() {
        let acl = scenario_acl();
        let actor = user(1);
        let view = acl.for_actor(&actor);
        let doc = Doc { owner_id: 1 };
        assert!(view.can_do(Action::Delete, Some(&doc)));
        assert!(!view.can_do(Action::Create, None));
    }

    #[test]
    fn test_acl_shared_across_threads() {
        let acl = Arc::new(scenario_acl());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let acl = acl.clone();
                std::thread::spawn(move || {
                    let actor = user(i);
                    acl.authorize(&actor, Action::Update, Some(&Doc { owner_id: i }))
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn test_rule_debug_hides_predicate() {
        let acl = scenario_acl();
        let dbg = format!("{:?}", acl.rules()[2]);
        assert!(dbg.contains("predicate: true"));
        assert!(dbg.contains("delete"));
    }
}
