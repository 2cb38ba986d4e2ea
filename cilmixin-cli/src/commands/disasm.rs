use std::{
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::bail;
use cilmixin::{
    assembly::{Instruction, Operand},
    metadata::{
        body::MethodBody,
        module::{Member, MethodId, TypeId},
    },
    Module,
};

use crate::commands::common::load_module;

pub fn run(path: &Path, type_filter: Option<&str>) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let types: Vec<TypeId> = match type_filter {
        Some(name) => match module.find_type(name) {
            Some(id) => vec![id],
            None => bail!("no type named '{name}' found"),
        },
        None => module.type_ids().collect(),
    };

    let stdout = io::stdout();
    let mut w = BufWriter::new(stdout.lock());

    writeln!(w, ".module {}", module.name)?;
    for attribute in &module.attributes {
        writeln!(w, ".custom {attribute}")?;
    }
    writeln!(w)?;

    for id in types {
        format_type(&mut w, &module, id)?;
    }

    w.flush()?;
    Ok(())
}

fn format_type(w: &mut dyn Write, module: &Module, id: TypeId) -> io::Result<()> {
    let def = module.type_def(id);
    write!(w, ".class {:?} {}", def.flags.visibility(), def.signature)?;
    if let Some(base) = &def.base {
        write!(w, " extends {base}")?;
    }
    if !def.interfaces.is_empty() {
        let interfaces: Vec<String> = def.interfaces.iter().map(ToString::to_string).collect();
        write!(w, " implements {}", interfaces.join(", "))?;
    }
    writeln!(w, " {{")?;
    for attribute in &def.attributes {
        writeln!(w, "  .custom {attribute}")?;
    }

    for field in &def.fields {
        let field = module.field(*field);
        writeln!(
            w,
            "  .field {:?} {} {}",
            field.flags, field.field_type, field.name
        )?;
    }

    for method in &def.methods {
        format_method(w, module, *method)?;
    }

    writeln!(w, "}}")?;
    writeln!(w)
}

fn format_method(w: &mut dyn Write, module: &Module, id: MethodId) -> io::Result<()> {
    let method = module.method(id);
    writeln!(w)?;
    writeln!(w, "  .method {:?}", method.flags)?;
    writeln!(w, "    {}", module.method_signature(id))?;
    for attribute in &method.attributes {
        writeln!(w, "    .custom {attribute}")?;
    }

    let Some(body) = &method.body else {
        return writeln!(w, "  {{ }}");
    };

    writeln!(w, "  {{")?;
    format_body(w, module, body)?;
    writeln!(w, "  }}")
}

fn format_body(w: &mut dyn Write, module: &Module, body: &MethodBody<Member>) -> io::Result<()> {
    writeln!(w, "    .maxstack {}", body.max_stack)?;
    if !body.locals.is_empty() {
        let init = if body.init_locals { "init " } else { "" };
        let locals: Vec<String> = body
            .locals
            .iter()
            .enumerate()
            .map(|(index, local)| format!("[{index}] {local}"))
            .collect();
        writeln!(w, "    .locals {init}({})", locals.join(", "))?;
    }

    for instruction in &body.instructions {
        writeln!(w, "    {}", format_instruction(module, instruction))?;
    }

    for handler in &body.exception_handlers {
        let label = |l: Option<_>| l.map_or_else(|| "end".to_string(), |l| format!("{l}"));
        write!(
            w,
            "    .try {} to {} handler {} to {} {:?}",
            handler.try_start,
            label(handler.try_end),
            handler.handler_start,
            label(handler.handler_end),
            handler.flags
        )?;
        if let Some(catch) = &handler.catch_type {
            write!(w, " {}", module.describe(catch))?;
        }
        if let Some(filter) = handler.filter_start {
            write!(w, " filter {filter}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

fn format_instruction(module: &Module, instruction: &Instruction<Member>) -> String {
    let operand = match &instruction.operand {
        Operand::None => String::new(),
        Operand::Immediate(value) => format!(" {value}"),
        Operand::Local(index) => format!(" V_{index}"),
        Operand::Argument(index) => format!(" A_{index}"),
        Operand::Target(label) => format!(" {label}"),
        Operand::Switch(labels) => {
            let labels: Vec<String> = labels.iter().map(ToString::to_string).collect();
            format!(" ({})", labels.join(", "))
        }
        Operand::Member(member) => format!(" {}", module.describe(member)),
    };
    format!("{}: {}{operand}", instruction.label, instruction.opcode)
}
