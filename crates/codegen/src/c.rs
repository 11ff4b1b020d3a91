//! C backend
//!
//! Emits a freestanding C99 translation unit: static tag storage,
//! `relay_init()` and `relay_scan(elapsed_us)`. Each scan reads mapped
//! inputs through extern hooks, computes every condition into a `fire_`
//! local (pre-scan state only), applies effects in source order with
//! the same fixed-width wrap/saturate arithmetic as the engine, then
//! drives mapped outputs.

use std::fmt::Write;

use tracing::debug;

use relay_model::{
    AddressMap, CmpOp, CountDirection, EdgeKind, Element, Expr, Instruction, IntWidth, Operand,
    OverflowPolicy, Program, Region, TagId, TimerKind, Value, ValueKind,
};

use crate::{Backend, CodegenResult};

pub struct CBackend;

impl Backend for CBackend {
    fn name(&self) -> &'static str {
        "c"
    }

    fn file_extension(&self) -> &'static str {
        "c"
    }

    fn generate(&self, program: &Program, map: &AddressMap) -> CodegenResult<String> {
        let mut emitter = Emitter::new(program, map);
        let out = emitter.emit()?;
        debug!(bytes = out.len(), "generated c source");
        Ok(out)
    }
}

struct Emitter<'a> {
    program: &'a Program,
    map: &'a AddressMap,
    /// Tags carrying a timer accumulator / counter register.
    timer_tags: Vec<TagId>,
    counter_tags: Vec<TagId>,
}

impl<'a> Emitter<'a> {
    fn new(program: &'a Program, map: &'a AddressMap) -> Self {
        let mut timer_tags = Vec::new();
        let mut counter_tags = Vec::new();
        for (_, instruction) in program.instructions() {
            match instruction {
                Instruction::Timer { tag, .. } if !timer_tags.contains(tag) => {
                    timer_tags.push(*tag);
                }
                Instruction::Counter { tag, .. } if !counter_tags.contains(tag) => {
                    counter_tags.push(*tag);
                }
                _ => {}
            }
        }
        Self {
            program,
            map,
            timer_tags,
            counter_tags,
        }
    }

    fn emit(&mut self) -> CodegenResult<String> {
        let mut out = String::new();
        writeln!(out, "/* generated polling loop; do not edit */")?;
        writeln!(out, "#include <stdint.h>")?;
        writeln!(out, "#include <stdbool.h>")?;
        writeln!(out)?;
        writeln!(out, "#define RELAY_REGION_INPUT 0u")?;
        writeln!(out, "#define RELAY_REGION_OUTPUT 1u")?;
        writeln!(out, "#define RELAY_REGION_HOLDING 2u")?;
        writeln!(out)?;

        self.emit_storage(&mut out)?;
        self.emit_hooks(&mut out)?;
        self.emit_init(&mut out)?;
        self.emit_scan(&mut out)?;
        Ok(out)
    }

    fn emit_storage(&self, out: &mut String) -> CodegenResult<()> {
        writeln!(out, "/* tag storage */")?;
        for (tag, decl) in self.program.tags().iter() {
            writeln!(
                out,
                "static {} {} = {};",
                c_type(decl.kind),
                self.var(tag),
                literal(decl.initial)
            )?;
            if self.timer_tags.contains(&tag) {
                writeln!(out, "static uint32_t {}_accum = 0u;", self.var(tag))?;
            }
            if self.counter_tags.contains(&tag) {
                writeln!(out, "static uint32_t {}_count = 0u;", self.var(tag))?;
                writeln!(out, "static bool {}_edge = false;", self.var(tag))?;
            }
        }
        writeln!(out)?;
        Ok(())
    }

    fn emit_hooks(&self, out: &mut String) -> CodegenResult<()> {
        let mut lines: Vec<String> = Vec::new();
        for (tag, address) in self.map.iter() {
            let Ok(kind) = self.program.tags().kind_of(tag) else {
                continue;
            };
            let line = match address.region {
                Region::Input => format!(
                    "extern {} relay_read_input_{}(uint16_t index);",
                    c_type(kind),
                    kind_tag(kind)
                ),
                Region::Output => format!(
                    "extern void relay_write_output_{}(uint16_t index, {} value);",
                    kind_tag(kind),
                    c_type(kind)
                ),
                Region::Holding => continue,
            };
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        for (_, instruction) in self.program.instructions() {
            let (tag, write) = match instruction {
                Instruction::Send { tag, .. } => (*tag, true),
                Instruction::Receive { tag, .. } => (*tag, false),
                _ => continue,
            };
            let Ok(kind) = self.program.tags().kind_of(tag) else {
                continue;
            };
            let line = if write {
                format!(
                    "extern bool relay_xchg_write_{}(uint8_t region, uint16_t index, {} value);",
                    kind_tag(kind),
                    c_type(kind)
                )
            } else {
                format!(
                    "extern bool relay_xchg_read_{}(uint8_t region, uint16_t index, {} *out);",
                    kind_tag(kind),
                    c_type(kind)
                )
            };
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        if !lines.is_empty() {
            writeln!(out, "/* hardware hooks */")?;
            for line in lines {
                writeln!(out, "{line}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn emit_init(&self, out: &mut String) -> CodegenResult<()> {
        writeln!(out, "void relay_init(void)")?;
        writeln!(out, "{{")?;
        for (tag, decl) in self.program.tags().iter() {
            writeln!(out, "    {} = {};", self.var(tag), literal(decl.initial))?;
            if self.timer_tags.contains(&tag) {
                writeln!(out, "    {}_accum = 0u;", self.var(tag))?;
            }
            if self.counter_tags.contains(&tag) {
                writeln!(out, "    {}_count = 0u;", self.var(tag))?;
                writeln!(out, "    {}_edge = false;", self.var(tag))?;
            }
        }
        writeln!(out, "}}")?;
        writeln!(out)?;
        Ok(())
    }

    fn emit_scan(&self, out: &mut String) -> CodegenResult<()> {
        writeln!(out, "void relay_scan(uint64_t elapsed_us)")?;
        writeln!(out, "{{")?;

        let inputs: Vec<_> = self
            .map
            .iter()
            .filter(|(_, a)| a.region == Region::Input)
            .collect();
        if !inputs.is_empty() {
            writeln!(out, "    /* latch inputs */")?;
            for (tag, address) in inputs {
                if let Ok(kind) = self.program.tags().kind_of(tag) {
                    writeln!(
                        out,
                        "    {} = relay_read_input_{}({}u);",
                        self.var(tag),
                        kind_tag(kind),
                        address.index
                    )?;
                }
            }
            writeln!(out)?;
        }

        writeln!(out, "    /* phase 1: conditions against pre-scan state */")?;
        for rung in self.program.rungs() {
            self.emit_conditions(out, &rung.condition, rung.body, &rung.elements, "true")?;
        }
        writeln!(out)?;

        writeln!(out, "    /* phase 2: effects in source order */")?;
        for rung in self.program.rungs() {
            self.emit_effects(out, rung.body, &rung.elements)?;
        }

        let outputs: Vec<_> = self
            .map
            .iter()
            .filter(|(_, a)| a.region == Region::Output)
            .collect();
        if !outputs.is_empty() {
            writeln!(out)?;
            writeln!(out, "    /* drive outputs */")?;
            for (tag, address) in outputs {
                if let Ok(kind) = self.program.tags().kind_of(tag) {
                    writeln!(
                        out,
                        "    relay_write_output_{}({}u, {});",
                        kind_tag(kind),
                        address.index,
                        self.var(tag)
                    )?;
                }
            }
        }

        writeln!(out, "}}")?;
        Ok(())
    }

    /// One `own_N` / `alt_N` / `fire_N` triple per condition body, with
    /// the same series/alternate composition as the engine.
    fn emit_conditions(
        &self,
        out: &mut String,
        condition: &Expr,
        body: relay_model::BodyId,
        elements: &[Element],
        ctx: &str,
    ) -> CodegenResult<()> {
        let n = body.index();
        writeln!(out, "    bool own_{n} = {};", self.expr(condition))?;
        let child_ctx = format!("({ctx} && own_{n})");
        let mut alt = format!("own_{n}");
        for element in elements {
            if let Element::Branch(branch) = element {
                self.emit_conditions(
                    out,
                    &branch.condition,
                    branch.body,
                    &branch.elements,
                    &child_ctx,
                )?;
                alt.push_str(&format!(" || alt_{}", branch.body.index()));
            }
        }
        writeln!(out, "    bool alt_{n} = {alt};")?;
        writeln!(out, "    bool fire_{n} = {ctx} && alt_{n};")?;
        Ok(())
    }

    fn emit_effects(
        &self,
        out: &mut String,
        body: relay_model::BodyId,
        elements: &[Element],
    ) -> CodegenResult<()> {
        let fire = format!("fire_{}", body.index());
        for element in elements {
            match element {
                Element::Instruction(instruction) => {
                    self.emit_instruction(out, instruction, &fire)?;
                }
                Element::Branch(branch) => {
                    self.emit_effects(out, branch.body, &branch.elements)?;
                }
            }
        }
        Ok(())
    }

    fn emit_instruction(
        &self,
        out: &mut String,
        instruction: &Instruction,
        fire: &str,
    ) -> CodegenResult<()> {
        let profile = self.program.profile();
        match instruction {
            Instruction::Out { tag } => {
                writeln!(out, "    {} = {fire};", self.var(*tag))?;
            }
            Instruction::Latch { tag } => {
                writeln!(out, "    if ({fire}) {{ {} = true; }}", self.var(*tag))?;
            }
            Instruction::Reset { tag } => {
                let var = self.var(*tag);
                write!(out, "    if ({fire}) {{ {var} = false;")?;
                if self.timer_tags.contains(tag) {
                    write!(out, " {var}_accum = 0u;")?;
                }
                if self.counter_tags.contains(tag) {
                    write!(out, " {var}_count = 0u;")?;
                }
                writeln!(out, " }}")?;
            }
            Instruction::Write { tag, value } => {
                writeln!(
                    out,
                    "    if ({fire}) {{ {} = {}; }}",
                    self.var(*tag),
                    self.operand(value)
                )?;
            }
            Instruction::Timer { tag, preset, kind } => {
                let var = self.var(*tag);
                let max = profile.timer_width.max();
                writeln!(out, "    {{")?;
                writeln!(
                    out,
                    "        uint64_t raw_{var} = (uint64_t){var}_accum + (elapsed_us / {}u);",
                    profile.time_base_us
                )?;
                writeln!(out, "        if ({fire}) {{")?;
                match profile.timer_overflow {
                    OverflowPolicy::Wrap => writeln!(
                        out,
                        "            {var}_accum = (uint32_t)(raw_{var} & {});",
                        mask_literal(profile.timer_width)
                    )?,
                    OverflowPolicy::Saturate => writeln!(
                        out,
                        "            {var}_accum = (raw_{var} > {max}u) ? {max}u : (uint32_t)raw_{var};"
                    )?,
                }
                match kind {
                    TimerKind::OnDelay => {
                        writeln!(out, "        }} else {{")?;
                        writeln!(out, "            {var}_accum = 0u;")?;
                        writeln!(out, "        }}")?;
                    }
                    TimerKind::Retentive => writeln!(out, "        }}")?,
                }
                writeln!(out, "        {var} = ({var}_accum >= {preset}u);")?;
                writeln!(out, "    }}")?;
            }
            Instruction::Counter {
                tag,
                preset,
                edge,
                direction,
            } => {
                let var = self.var(*tag);
                let mask = mask_literal(profile.counter_width);
                let trigger = match edge {
                    EdgeKind::Rising => format!("{fire} && !{var}_edge"),
                    EdgeKind::Falling => format!("!{fire} && {var}_edge"),
                };
                let step = match direction {
                    CountDirection::Up => format!("({var}_count + 1u)"),
                    CountDirection::Down => format!("({var}_count - 1u)"),
                };
                writeln!(out, "    {{")?;
                writeln!(out, "        if ({trigger}) {{")?;
                writeln!(out, "            {var}_count = (uint32_t)({step} & {mask});")?;
                writeln!(out, "        }}")?;
                writeln!(out, "        {var}_edge = {fire};")?;
                writeln!(out, "        {var} = ({var}_count >= {preset}u);")?;
                writeln!(out, "    }}")?;
            }
            Instruction::Send { tag, address } => {
                let Ok(kind) = self.program.tags().kind_of(*tag) else {
                    return Ok(());
                };
                writeln!(
                    out,
                    "    if ({fire}) {{ (void)relay_xchg_write_{}({}, {}u, {}); }}",
                    kind_tag(kind),
                    region_macro(address.region),
                    address.index,
                    self.var(*tag)
                )?;
            }
            Instruction::Receive { tag, address } => {
                let Ok(kind) = self.program.tags().kind_of(*tag) else {
                    return Ok(());
                };
                let var = self.var(*tag);
                writeln!(out, "    if ({fire}) {{")?;
                writeln!(out, "        {} in_{var};", c_type(kind))?;
                writeln!(
                    out,
                    "        if (relay_xchg_read_{}({}, {}u, &in_{var})) {{ {var} = in_{var}; }}",
                    kind_tag(kind),
                    region_macro(address.region),
                    address.index
                )?;
                writeln!(out, "    }}")?;
            }
        }
        Ok(())
    }

    fn var(&self, tag: TagId) -> String {
        let name = self
            .program
            .tags()
            .get(tag)
            .map(|decl| sanitize(&decl.name))
            .unwrap_or_default();
        format!("t{}_{name}", tag.index())
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Tag(tag) => self.var(*tag),
            Expr::Not(inner) => format!("!{}", self.expr(inner)),
            Expr::All(items) if items.is_empty() => "true".to_string(),
            Expr::All(items) => {
                let parts: Vec<_> = items.iter().map(|e| self.expr(e)).collect();
                format!("({})", parts.join(" && "))
            }
            Expr::Any(items) if items.is_empty() => "false".to_string(),
            Expr::Any(items) => {
                let parts: Vec<_> = items.iter().map(|e| self.expr(e)).collect();
                format!("({})", parts.join(" || "))
            }
            Expr::Cmp { op, lhs, rhs } => {
                format!("({} {} {})", self.operand(lhs), c_op(*op), self.operand(rhs))
            }
        }
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Tag(tag) => self.var(*tag),
            Operand::Const(value) => literal(*value),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn c_type(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Bool => "bool",
        ValueKind::I8 => "int8_t",
        ValueKind::U8 => "uint8_t",
        ValueKind::I16 => "int16_t",
        ValueKind::U16 => "uint16_t",
        ValueKind::I32 => "int32_t",
        ValueKind::U32 => "uint32_t",
        ValueKind::F32 => "float",
        ValueKind::F64 => "double",
    }
}

fn kind_tag(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Bool => "bool",
        ValueKind::I8 => "i8",
        ValueKind::U8 => "u8",
        ValueKind::I16 => "i16",
        ValueKind::U16 => "u16",
        ValueKind::I32 => "i32",
        ValueKind::U32 => "u32",
        ValueKind::F32 => "f32",
        ValueKind::F64 => "f64",
    }
}

fn c_op(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
    }
}

fn region_macro(region: Region) -> &'static str {
    match region {
        Region::Input => "RELAY_REGION_INPUT",
        Region::Output => "RELAY_REGION_OUTPUT",
        Region::Holding => "RELAY_REGION_HOLDING",
    }
}

fn mask_literal(width: IntWidth) -> &'static str {
    match width {
        IntWidth::W16 => "0xFFFFu",
        IntWidth::W32 => "0xFFFFFFFFu",
    }
}

fn literal(value: Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::I8(n) => format!("(int8_t){n}"),
        Value::U8(n) => format!("(uint8_t){n}u"),
        Value::I16(n) => format!("(int16_t){n}"),
        Value::U16(n) => format!("(uint16_t){n}u"),
        Value::I32(n) => n.to_string(),
        Value::U32(n) => format!("{n}u"),
        Value::F32(f) => float_literal(f as f64, "f"),
        Value::F64(f) => float_literal(f, ""),
    }
}

fn float_literal(f: f64, suffix: &str) -> String {
    if f.is_nan() {
        format!("(0.0{suffix}/0.0{suffix})")
    } else if f.is_infinite() {
        let sign = if f < 0.0 { "-" } else { "" };
        format!("({sign}1.0{suffix}/0.0{suffix})")
    } else {
        format!("{f:?}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_model::{HwAddress, ProgramBuilder, TargetProfile};

    fn sample() -> (Program, AddressMap) {
        let mut b = ProgramBuilder::new(TargetProfile::micro16());
        let button = b.declare("button", ValueKind::Bool).unwrap();
        let enable = b.declare("enable", ValueKind::Bool).unwrap();
        let light = b.declare("light", ValueKind::Bool).unwrap();
        let done = b.declare("done", ValueKind::Bool).unwrap();
        let count = b.declare("count", ValueKind::Bool).unwrap();
        let n = b.declare("n", ValueKind::U16).unwrap();

        b.begin_rung(Expr::Tag(button)).unwrap();
        b.begin_branch(Expr::Tag(enable)).unwrap();
        b.write(n, Operand::Const(Value::U16(5))).unwrap();
        b.end_branch().unwrap();
        b.out(light).unwrap();
        b.timer(done, 100, TimerKind::OnDelay).unwrap();
        b.counter(count, 3, EdgeKind::Rising, CountDirection::Up).unwrap();
        b.end_rung().unwrap();
        let program = b.finish().unwrap();

        let mut map = AddressMap::new();
        map.assign(
            button,
            HwAddress {
                region: Region::Input,
                index: 0,
            },
        );
        map.assign(
            light,
            HwAddress {
                region: Region::Output,
                index: 0,
            },
        );
        (program, map)
    }

    #[test]
    fn emits_the_two_phase_shape() {
        let (program, map) = sample();
        let source = CBackend.generate(&program, &map).unwrap();

        assert!(source.contains("void relay_init(void)"));
        assert!(source.contains("void relay_scan(uint64_t elapsed_us)"));
        // Inputs first, then every fire local, then effects.
        let input = source.find("relay_read_input_bool(0u)").unwrap();
        let fire = source.find("bool fire_0").unwrap();
        let effect = source.find("t2_light = fire_0;").unwrap();
        let output = source.find("relay_write_output_bool(0u, t2_light)").unwrap();
        assert!(input < fire && fire < effect && effect < output);
    }

    #[test]
    fn branch_composition_matches_the_engine() {
        let (program, map) = sample();
        let source = CBackend.generate(&program, &map).unwrap();
        // Rung body 0, branch body 1.
        assert!(source.contains("bool alt_0 = own_0 || alt_1;"));
        assert!(source.contains("bool fire_1 = (true && own_0) && alt_1;"));
        assert!(source.contains("bool fire_0 = true && alt_0;"));
    }

    #[test]
    fn micro16_arithmetic_wraps_at_sixteen_bits() {
        let (program, map) = sample();
        let source = CBackend.generate(&program, &map).unwrap();
        // Timer on micro16 wraps; counter masks to the declared width.
        assert!(source.contains("raw_t3_done & 0xFFFFu"));
        assert!(source.contains("(t4_count_count + 1u) & 0xFFFFu"));
        assert!(source.contains("elapsed_us / 10000u"));
    }

    #[test]
    fn saturating_profile_clamps_instead() {
        let mut b = ProgramBuilder::new(TargetProfile::generic());
        let done = b.declare("done", ValueKind::Bool).unwrap();
        b.begin_rung(Expr::always()).unwrap();
        b.timer(done, 10, TimerKind::Retentive).unwrap();
        b.end_rung().unwrap();
        let program = b.finish().unwrap();

        let source = CBackend.generate(&program, &AddressMap::new()).unwrap();
        assert!(source.contains("(raw_t0_done > 4294967295u) ? 4294967295u : (uint32_t)raw_t0_done"));
    }

    #[test]
    fn emission_is_deterministic() {
        let (program, map) = sample();
        let first = CBackend.generate(&program, &map).unwrap();
        let second = CBackend.generate(&program, &map).unwrap();
        assert_eq!(first, second);
    }
}
