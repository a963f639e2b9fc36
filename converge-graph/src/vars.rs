use std::collections::BTreeMap;

use converge_types::decl::ResourceSpec;
use converge_types::plan::PlanDoc;
use tracing::debug;

/// Overlay externally resolved template variables onto every template
/// declaration in the document. External values win over plan-embedded ones;
/// the overlay happens before validation, so a run sees one resolved
/// configuration, not mutable global state.
pub fn overlay_variables(doc: &mut PlanDoc, vars: &BTreeMap<String, String>) {
    if vars.is_empty() {
        return;
    }
    for decl in &mut doc.resources {
        if let ResourceSpec::Template(tmpl) = &mut decl.spec {
            for (name, value) in vars {
                tmpl.variables.insert(name.clone(), value.clone());
            }
        }
    }
    debug!(count = vars.len(), "overlaid template variables");
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_types::decl::{ResourceDecl, TemplateSpec};

    fn template_doc() -> PlanDoc {
        let mut variables = BTreeMap::new();
        variables.insert("port".to_string(), "8080".to_string());
        variables.insert("host".to_string(), "localhost".to_string());
        PlanDoc {
            schema: converge_types::schema::CONVERGE_PLAN_V1.to_string(),
            resources: vec![ResourceDecl {
                spec: ResourceSpec::Template(TemplateSpec {
                    path: "/etc/app/service.yml".into(),
                    template: "service.yml.tmpl".into(),
                    variables,
                    owner: None,
                    group: None,
                    mode: None,
                    backup: None,
                }),
                requires: vec![],
                notifies: vec![],
            }],
        }
    }

    #[test]
    fn external_variables_win_over_plan_embedded() {
        let mut doc = template_doc();
        let mut vars = BTreeMap::new();
        vars.insert("port".to_string(), "9090".to_string());
        vars.insert("zone".to_string(), "eu".to_string());

        overlay_variables(&mut doc, &vars);

        let ResourceSpec::Template(tmpl) = &doc.resources[0].spec else {
            panic!("expected template");
        };
        assert_eq!(tmpl.variables.get("port").map(String::as_str), Some("9090"));
        assert_eq!(tmpl.variables.get("host").map(String::as_str), Some("localhost"));
        assert_eq!(tmpl.variables.get("zone").map(String::as_str), Some("eu"));
    }

    #[test]
    fn empty_overlay_leaves_document_untouched() {
        let mut doc = template_doc();
        overlay_variables(&mut doc, &BTreeMap::new());
        let ResourceSpec::Template(tmpl) = &doc.resources[0].spec else {
            panic!("expected template");
        };
        assert_eq!(tmpl.variables.len(), 2);
    }
}
