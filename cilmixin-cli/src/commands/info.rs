use std::{path::Path, sync::Arc};

use anyhow::Context;
use cilmixin::{
    mixin::{Intent, IntentKind, Intents, PatchLoader},
    Module,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_module},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub file: String,
    pub name: String,
    pub type_count: usize,
    pub field_count: usize,
    pub method_count: usize,
    pub method_body_count: usize,
    pub type_ref_count: usize,
    pub member_ref_count: usize,
    pub user_string_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchInfo>,
}

/// Intent summary of a patch module.
#[derive(Debug, Serialize)]
pub struct PatchInfo {
    pub target: String,
    pub required: Vec<String>,
    pub dependencies: usize,
    pub injects: usize,
    pub mixins: Vec<MixinInfo>,
    pub annotated: Vec<AnnotatedType>,
}

#[derive(Debug, Serialize)]
pub struct MixinInfo {
    pub target: String,
    pub merged_methods: usize,
    pub interfaces: usize,
}

#[derive(Debug, Serialize)]
pub struct AnnotatedType {
    pub name: String,
    pub intents: Vec<String>,
}

fn describe(intent: &Intent) -> String {
    let kind = IntentKind::from(intent);
    match intent.argument() {
        Some(argument) => format!("{kind}({argument})"),
        None => kind.to_string(),
    }
}

fn patch_info(module: Module) -> anyhow::Result<Option<PatchInfo>> {
    let intents = Intents::parse(&module.attributes).context("unreadable module intents")?;
    if intents.patch().is_none() {
        return Ok(None);
    }

    let mut annotated = Vec::new();
    for id in module.type_ids() {
        let def = module.type_def(id);
        let intents = Intents::parse(&def.attributes)
            .with_context(|| format!("unreadable intents on {}", def.signature))?;
        if !intents.is_empty() {
            annotated.push(AnnotatedType {
                name: def.signature.to_string(),
                intents: intents.iter().map(describe).collect(),
            });
        }
    }

    let config = PatchLoader::new().load(Arc::new(module))?;
    Ok(Some(PatchInfo {
        target: config.target().to_string(),
        required: config.required().to_vec(),
        dependencies: config.dependencies().len(),
        injects: config.injects().len(),
        mixins: config
            .mixins()
            .iter()
            .map(|mixin| MixinInfo {
                target: mixin.dependency().signature().to_string(),
                merged_methods: mixin.actions().len(),
                interfaces: mixin.interfaces().len(),
            })
            .collect(),
        annotated,
    }))
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let mut info = ModuleInfo {
        file: file_display_name(path),
        name: module.name.clone(),
        type_count: module.types.len(),
        field_count: module.fields.len(),
        method_count: module.methods.len(),
        method_body_count: module.methods.iter().filter(|m| m.body.is_some()).count(),
        type_ref_count: module.type_refs.len(),
        member_ref_count: module.member_refs.len(),
        user_string_count: module.user_strings.len(),
        patch: None,
    };
    info.patch = patch_info(module)
        .with_context(|| format!("invalid patch module: {}", path.display()))?;

    print_output(&info, opts, |info| {
        println!("File:          {}", info.file);
        println!("Module:        {}", info.name);
        println!("Types:         {}", info.type_count);
        println!("Fields:        {}", info.field_count);
        println!(
            "Methods:       {} ({} with bodies)",
            info.method_count, info.method_body_count
        );
        println!("Type refs:     {}", info.type_ref_count);
        println!("Member refs:   {}", info.member_ref_count);
        println!("User strings:  {}", info.user_string_count);

        let Some(patch) = &info.patch else {
            return;
        };
        println!("\nPatches:       {}", patch.target);
        if !patch.required.is_empty() {
            println!("Required:      {}", patch.required.join(", "));
        }
        println!("Dependencies:  {}", patch.dependencies);
        println!("Injects:       {}", patch.injects);

        if !patch.mixins.is_empty() {
            println!("\nMixins:");
            let mut tw = TabWriter::new(vec![
                ("Target", Align::Left),
                ("Merged", Align::Right),
                ("Interfaces", Align::Right),
            ])
            .indent("  ");
            for mixin in &patch.mixins {
                tw.row(vec![
                    mixin.target.clone(),
                    mixin.merged_methods.to_string(),
                    mixin.interfaces.to_string(),
                ]);
            }
            tw.print();
        }

        if !patch.annotated.is_empty() {
            println!("\nAnnotated types:");
            let mut tw =
                TabWriter::new(vec![("Type", Align::Left), ("Intents", Align::Left)]).indent("  ");
            for annotated in &patch.annotated {
                tw.row(vec![annotated.name.clone(), annotated.intents.join(", ")]);
            }
            tw.print();
        }
    })
}
