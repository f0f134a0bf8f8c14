mod common;

use common::{open, project, public_registration, register, repo, Users, FAR_FUTURE_MS};
use regview_core::filter::params::parse_timestamp_millis;
use regview_core::filter::parse_filter_params;
use regview_core::model::node::{Node, NodeCategory, NodeId, NodeLicense, NodeValidationError};
use regview_core::repo::{NodeQuery, NodeRepository, ReadScope, RepoError};
use serde_json::json;
use uuid::Uuid;

#[test]
fn create_and_get_roundtrip_preserves_registration_state() {
    let conn = open();
    let repo = repo(&conn);
    let users = Users::new();

    let mut source = project(&users, "Survey", 1_000);
    source.description = "Sleep survey".to_string();
    source.set_tags(["Survey", "data"]);
    source.license = Some(NodeLicense {
        name: "CC-By Attribution 4.0 International".to_string(),
        year: Some("2016".to_string()),
        copyright_holders: vec!["Sleep Lab".to_string()],
    });
    repo.create_node(&source).unwrap();

    let mut registration = Node::registration_of(&source, users.admin, 5_000);
    {
        let meta = registration.registration.as_mut().unwrap();
        meta.registration_supplement = Some("Open-Ended Registration".to_string());
        meta.registered_meta = Some(json!({"summary": {"value": "sleep"}}));
        meta.embargo_end_date = Some(FAR_FUTURE_MS);
    }
    repo.create_node(&registration).unwrap();

    let loaded = repo.get_node(registration.id, false).unwrap().unwrap();
    assert_eq!(loaded, registration);
    assert_eq!(loaded.tags, vec!["data", "survey"]);
    assert_eq!(
        loaded.contributors.iter().map(|c| c.user_id).collect::<Vec<_>>(),
        vec![users.admin, users.writer, users.reader]
    );
}

#[test]
fn create_rejects_invalid_node() {
    let conn = open();
    let repo = repo(&conn);

    let node = Node::new("   ", 1_000);
    match repo.create_node(&node) {
        Err(RepoError::Validation(NodeValidationError::EmptyTitle)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(repo.get_node(node.id, true).unwrap().is_none());
}

#[test]
fn soft_deleted_nodes_are_hidden_unless_requested() {
    let conn = open();
    let repo = repo(&conn);

    let node = Node::new("project", 1_000);
    repo.create_node(&node).unwrap();
    repo.soft_delete_node(node.id).unwrap();

    assert!(repo.get_node(node.id, false).unwrap().is_none());
    assert!(repo.get_node(node.id, true).unwrap().unwrap().is_deleted);

    let missing = Uuid::new_v4();
    assert!(matches!(
        repo.soft_delete_node(missing),
        Err(RepoError::NotFound(id)) if id == missing
    ));
}

#[test]
fn find_nodes_applies_scope_and_exclusions() {
    let conn = open();
    let repo = repo(&conn);
    let users = Users::new();

    let public = public_registration(&repo, &users, "public", 3_000);
    let private = register(&repo, &users, &project(&users, "private", 2_000), 4_000, false);

    let mut live = Node::new("live project", 5_000);
    live.is_public = true;
    repo.create_node(&live).unwrap();

    let mut collection = Node::registration_of(&project(&users, "collection", 6_000), users.admin, 7_000);
    collection.is_public = true;
    collection.is_collection = true;
    repo.create_node(&collection).unwrap();

    let deleted = public_registration(&repo, &users, "deleted", 8_000);
    repo.soft_delete_node(deleted.id).unwrap();

    let ids = |scope: ReadScope| -> Vec<NodeId> {
        repo.find_nodes(&NodeQuery {
            registrations_only: true,
            scope,
            ..NodeQuery::default()
        })
        .unwrap()
        .into_iter()
        .map(|node| node.id)
        .collect()
    };

    assert_eq!(ids(ReadScope::Public), vec![public.id]);
    assert_eq!(
        ids(ReadScope::PublicOrContributor(users.reader)),
        vec![public.id, private.id]
    );
    assert_eq!(
        ids(ReadScope::PublicOrContributor(users.stranger)),
        vec![public.id]
    );

    let everything = repo
        .find_nodes(&NodeQuery {
            include_deleted: true,
            include_collections: true,
            ..NodeQuery::default()
        })
        .unwrap();
    assert_eq!(everything.len(), 5);
    assert_eq!(everything[0].id, deleted.id);
}

#[test]
fn find_nodes_compiles_filters_to_sql() {
    let conn = open();
    let repo = repo(&conn);
    let users = Users::new();
    let others = Users::new();

    let at = |raw: &str| parse_timestamp_millis(raw).unwrap();

    let mut survey_source = project(&users, "Survey of sleep", at("2020-01-01T00:00:00Z"));
    survey_source.category = NodeCategory::Data;
    survey_source.set_tags(["sleep", "Survey"]);
    let survey = register(&repo, &users, &survey_source, at("2022-01-01T00:00:00Z"), true);

    let mut microbes_source = project(&others, "Gut microbes", at("2020-01-02T12:00:00Z"));
    microbes_source.category = NodeCategory::Hypothesis;
    microbes_source.set_tags(["biology"]);
    let microbes = register(&repo, &others, &microbes_source, at("2022-01-01T00:00:00Z"), true);

    let mut diet_source = project(&users, "Sleep & diet", at("2021-06-01T00:00:00Z"));
    diet_source.category = NodeCategory::Data;
    let diet = register(&repo, &users, &diet_source, at("2022-01-01T00:00:00Z"), true);

    let ids_for = |params: &[(&str, &str)]| -> Vec<NodeId> {
        let filter = parse_filter_params(params.iter().copied()).unwrap();
        repo.find_nodes(&NodeQuery {
            registrations_only: true,
            filter,
            ..NodeQuery::default()
        })
        .unwrap()
        .into_iter()
        .map(|node| node.id)
        .collect()
    };

    assert_eq!(ids_for(&[("filter[title]", "sleep")]), vec![diet.id, survey.id]);
    assert_eq!(ids_for(&[("filter[title][contains]", "Sleep")]), vec![diet.id]);
    assert_eq!(ids_for(&[("filter[tags]", "SLEEP")]), vec![survey.id]);
    assert_eq!(ids_for(&[("filter[tags]", "null")]), vec![diet.id]);
    assert_eq!(ids_for(&[("filter[category]", "data")]), vec![diet.id, survey.id]);
    assert_eq!(ids_for(&[("filter[date_created]", "2020-01-02")]), vec![microbes.id]);
    assert_eq!(
        ids_for(&[("filter[date_created][gte]", "2020-01-02")]),
        vec![diet.id, microbes.id]
    );
    let bulk = format!("{},{}", survey.id, microbes.id);
    assert_eq!(
        ids_for(&[("filter[id]", bulk.as_str())]),
        vec![microbes.id, survey.id]
    );
    let reader = users.reader.to_string();
    assert_eq!(
        ids_for(&[("filter[contributors]", reader.as_str())]),
        vec![diet.id, survey.id]
    );
    assert_eq!(ids_for(&[("filter[parent]", "null")]).len(), 3);
    assert!(ids_for(&[("filter[public]", "false")]).is_empty());
    assert_eq!(
        ids_for(&[("filter[category]", "data"), ("filter[tags]", "survey")]),
        vec![survey.id]
    );
}

#[test]
fn save_refuses_to_unpublish_registration() {
    let conn = open();
    let repo = repo(&conn);
    let users = Users::new();

    let mut registration = public_registration(&repo, &users, "published", 1_000);
    registration.is_public = false;
    assert!(matches!(
        repo.save_node(&registration),
        Err(RepoError::PublicFlagReset(id)) if id == registration.id
    ));
    assert!(repo.get_node(registration.id, false).unwrap().unwrap().is_public);

    let mut live = Node::new("live", 1_000);
    live.is_public = true;
    repo.create_node(&live).unwrap();
    live.is_public = false;
    repo.save_node(&live).unwrap();
    assert!(!repo.get_node(live.id, false).unwrap().unwrap().is_public);
}

#[test]
fn update_node_with_commits_only_on_success() {
    let conn = open();
    let repo = repo(&conn);
    let users = Users::new();
    let registration = register(&repo, &users, &project(&users, "draft", 1_000), 2_000, false);

    let aborted: Result<(Node, ()), RepoError> = repo.update_node_with(registration.id, |node| {
        node.is_public = true;
        Err(RepoError::InvalidData("abort".to_string()))
    });
    assert!(aborted.is_err());
    assert!(!repo.get_node(registration.id, false).unwrap().unwrap().is_public);

    let (updated, flipped) = repo
        .update_node_with(registration.id, |node| Ok::<_, RepoError>(node.make_public()))
        .unwrap();
    assert!(flipped);
    assert!(updated.is_public);
    assert!(repo.get_node(registration.id, false).unwrap().unwrap().is_public);

    let missing = Uuid::new_v4();
    let result: Result<(Node, ()), RepoError> = repo.update_node_with(missing, |_| Ok(()));
    assert!(matches!(result, Err(RepoError::NotFound(id)) if id == missing));
}

#[test]
fn node_links_roundtrip_and_require_existing_nodes() {
    let conn = open();
    let repo = repo(&conn);
    let users = Users::new();

    let registration = public_registration(&repo, &users, "linked", 1_000);
    let target = Node::new("target", 500);
    repo.create_node(&target).unwrap();

    let link = repo.create_node_link(registration.id, target.id).unwrap();
    assert_eq!(link.node_id, registration.id);
    assert_eq!(link.target_id, target.id);
    assert_eq!(repo.list_node_links(registration.id).unwrap(), vec![link]);
    assert!(repo.list_node_links(target.id).unwrap().is_empty());

    let missing = Uuid::new_v4();
    assert!(matches!(
        repo.create_node_link(registration.id, missing),
        Err(RepoError::NotFound(id)) if id == missing
    ));
}
