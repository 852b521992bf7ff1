//! C text of an operator.
//!
//! The emitted function mirrors what `apply` runs: a rotating time loop,
//! one OpenMP parallel loop nest per equation with the leading axes
//! blocked, and one loop over source points per injection.
//! The text is an artifact for inspection, nothing here compiles it.

use crate::error::*;
use crate::field::FieldKind;
use crate::operator::*;
use crate::real::{DType, Real};
use crate::symbolic::{Access, Expr};
use std::path::Path;

const INDENT: &str = "  ";

struct CWriter {
    out: String,
    depth: usize,
}

impl CWriter {
    fn new() -> Self {
        CWriter {
            out: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn open(&mut self) {
        self.line("{");
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }
}

fn literal(dtype: DType, value: f64) -> String {
    match dtype {
        DType::Float32 => format!("{:?}F", value as f32),
        DType::Float64 => format!("{value:?}"),
    }
}

fn index(base: &str, shift: i32) -> String {
    match shift {
        0 => base.to_string(),
        s if s > 0 => format!("{base} + {s}"),
        s => format!("{base} - {}", -s),
    }
}

/// Print `expr` as a C expression. `access` prints field reads,
/// `source` is the text of the current source sample.
fn c_expr<const GRID_DIMENSION: usize>(
    dtype: DType,
    expr: &Expr<GRID_DIMENSION>,
    access: &dyn Fn(&Access<GRID_DIMENSION>) -> String,
    source: &str,
) -> String {
    let wrap = |e: &Expr<GRID_DIMENSION>, compound_mul: bool| {
        let text = c_expr(dtype, e, access, source);
        match e {
            Expr::Add(_) => format!("({text})"),
            Expr::Mul(_) if compound_mul => format!("({text})"),
            Expr::Const(v) if *v < 0.0 => format!("({text})"),
            _ => text,
        }
    };
    match expr {
        Expr::Const(v) => literal(dtype, *v),
        Expr::Symbol(s) => s.name(),
        Expr::Access(a) => access(a),
        Expr::Source => source.to_string(),
        Expr::Add(terms) => {
            let mut text = String::new();
            for (i, t) in terms.iter().enumerate() {
                let term = c_expr(dtype, t, access, source);
                match (i, term.strip_prefix('-')) {
                    (0, _) => text.push_str(&term),
                    (_, Some(rest)) => {
                        text.push_str(" - ");
                        text.push_str(rest);
                    }
                    (_, None) => {
                        text.push_str(" + ");
                        text.push_str(&term);
                    }
                }
            }
            text
        }
        Expr::Mul(factors) => factors
            .iter()
            .enumerate()
            .map(|(i, f)| match f {
                // leading negative constants need no parentheses
                Expr::Const(_) if i == 0 => c_expr(dtype, f, access, source),
                f => wrap(f, false),
            })
            .collect::<Vec<_>>()
            .join("*"),
        Expr::Pow(base, e) => {
            let base = wrap(base, true);
            let product = vec![base; e.unsigned_abs() as usize].join("*");
            if *e < 0 {
                format!("{}/({})", literal(dtype, 1.0), product)
            } else {
                format!("({product})")
            }
        }
    }
}

/// Name of the rotating index holding shift `shift` of a field
/// with `buffers` time buffers.
fn time_index(buffers: usize, shift: i32, single_modulus: bool) -> String {
    let k = shift.rem_euclid(buffers as i32);
    if single_modulus {
        format!("t{k}")
    } else {
        format!("t{buffers}_{k}")
    }
}

impl<T: Real, const GRID_DIMENSION: usize> Operator<T, GRID_DIMENSION> {
    fn time_moduli(&self) -> Vec<usize> {
        let mut moduli: Vec<usize> = self
            .fields()
            .iter()
            .filter_map(|f| match f.kind {
                FieldKind::TimeFunction { time_order } => Some(time_order + 1),
                FieldKind::Function => None,
            })
            .collect();
        moduli.sort_unstable();
        moduli.dedup();
        moduli
    }

    fn field_info(&self, access: &Access<GRID_DIMENSION>) -> Option<&FieldInfo> {
        self.fields().iter().find(|f| f.id == access.field)
    }

    /// `name[t][i0 + h + o0]...` for an access whose per axis base
    /// index is `bases[d]`.
    fn c_access(&self, access: &Access<GRID_DIMENSION>, bases: &[String]) -> String {
        let single = self.time_moduli().len() <= 1;
        let (halo, time) = match self.field_info(access) {
            Some(info) => (info.halo, info.kind),
            None => (0, FieldKind::Function),
        };
        let mut text = access.name.to_string();
        if let (FieldKind::TimeFunction { time_order }, Some(shift)) = (time, access.time) {
            text.push_str(&format!("[{}]", time_index(time_order + 1, shift, single)));
        }
        for d in 0..GRID_DIMENSION {
            text.push_str(&format!("[{}]", index(&bases[d], halo + access.offset[d])));
        }
        text
    }

    /// Generated C code of the operator.
    pub fn ccode(&self) -> String {
        let dtype = T::DTYPE;
        let real = dtype.c_name();
        let names = self.grid().dimension_names();
        let blocked = self.num_blocked();
        let sections = self.num_equations() + self.num_injections();
        let mut w = CWriter::new();

        w.line("#define _POSIX_C_SOURCE 200809L");
        w.line("#define START(S) struct timeval start_ ## S , end_ ## S ; gettimeofday(&start_ ## S , NULL);");
        w.line("#define STOP(S,T) gettimeofday(&end_ ## S, NULL); T->S += (double)(end_ ## S .tv_sec-start_ ## S.tv_sec)+(double)(end_ ## S .tv_usec-start_ ## S .tv_usec)/1000000;");
        w.line("#define MIN(a,b) (((a) < (b)) ? (a) : (b))");
        w.line("");
        for header in ["stdlib.h", "math.h", "sys/time.h", "omp.h"] {
            w.line(&format!("#include \"{header}\""));
        }
        w.line("");
        w.line("struct dataobj");
        w.open();
        for member in [
            "void *restrict data;",
            "unsigned long * size;",
            "unsigned long * npsize;",
            "unsigned long * dsize;",
            "int * hsize;",
            "int * hofs;",
            "int * oofs;",
            "void * dmap;",
        ] {
            w.line(member);
        }
        w.depth -= 1;
        w.line("} ;");
        w.line("");
        w.line("struct profiler");
        w.open();
        for s in 0..sections {
            w.line(&format!("double section{s};"));
        }
        w.depth -= 1;
        w.line("} ;");
        w.line("");

        // array objects: fields, then sources and their coordinates
        let mut arrays: Vec<(String, usize)> = self
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.shape.len()))
            .collect();
        for inj in &self.injections {
            let name = inj.injection.source_name();
            if !arrays.iter().any(|(n, _)| n == name) {
                arrays.push((name.to_string(), 2));
                arrays.push((format!("{name}_coords"), 2));
            }
        }

        let mut params: Vec<String> = arrays
            .iter()
            .map(|(n, _)| format!("struct dataobj *restrict {n}_vec"))
            .collect();
        for (symbol, _) in self.subs().iter() {
            params.push(format!("const {real} {}", symbol.name()));
        }
        if !self.injections.is_empty() {
            for n in &names {
                params.push(format!("const {real} o_{n}"));
            }
        }
        params.push("const int time_M".to_string());
        params.push("const int time_m".to_string());
        for b in self.block_dimensions() {
            params.push(format!("const int {b}"));
        }
        for n in &names {
            params.push(format!("const int {n}_M"));
            params.push(format!("const int {n}_m"));
        }
        let mut seen_sources: Vec<&str> = Vec::new();
        for inj in &self.injections {
            let name = inj.injection.source_name();
            if !seen_sources.contains(&name) {
                seen_sources.push(name);
                params.push(format!("const int p_{name}_M"));
                params.push(format!("const int p_{name}_m"));
            }
        }
        params.push("const int nthreads".to_string());
        params.push("struct profiler * timers".to_string());
        w.line(&format!("int {}({})", self.name(), params.join(", ")));
        w.open();

        for (name, rank) in &arrays {
            if *rank == 1 {
                w.line(&format!(
                    "{real} *restrict {name} __attribute__ ((aligned (64))) = ({real} *) {name}_vec->data;"
                ));
            } else {
                let dims: String = (1..*rank)
                    .map(|i| format!("[{name}_vec->size[{i}]]"))
                    .collect();
                w.line(&format!(
                    "{real} (*restrict {name}){dims} __attribute__ ((aligned (64))) = ({real} (*){dims}) {name}_vec->data;"
                ));
            }
        }
        w.line("");

        // rotating time indices
        let moduli = self.time_moduli();
        let single = moduli.len() <= 1;
        let mut time_vars = Vec::new();
        for n in &moduli {
            for k in 0..*n {
                let var = time_index(*n, k as i32, single);
                let value = if k == 0 {
                    format!("(time)%({n})")
                } else {
                    format!("(time + {k})%({n})")
                };
                time_vars.push(format!("{var} = {value}"));
            }
        }
        let mut init = vec!["int time = time_m".to_string()];
        init.extend(time_vars.iter().cloned());
        let mut step = vec!["time += 1".to_string()];
        step.extend(time_vars.iter().cloned());
        w.line(&format!(
            "for ({}; time <= time_M; {})",
            init.join(", "),
            step.join(", ")
        ));
        w.open();

        let loop_vars: Vec<String> = names.to_vec();
        let mut section = 0;
        for eq in &self.equations {
            w.line(&format!("START(section{section})"));
            w.line("#pragma omp parallel num_threads(nthreads)");
            w.open();
            if blocked == 0 {
                w.line("#pragma omp for schedule(static,1)");
            } else {
                w.line(&format!("#pragma omp for collapse({blocked}) schedule(dynamic,1)"));
            }
            let mut opened = 0;
            for n in names.iter().take(blocked) {
                w.line(&format!(
                    "for (int {n}0_blk0 = {n}_m; {n}0_blk0 <= {n}_M; {n}0_blk0 += {n}0_blk0_size)"
                ));
                w.open();
                opened += 1;
            }
            for (d, n) in names.iter().enumerate() {
                if d < blocked {
                    w.line(&format!(
                        "for (int {n} = {n}0_blk0; {n} <= MIN({n}_M, {n}0_blk0 + {n}0_blk0_size - 1); {n} += 1)"
                    ));
                } else {
                    if d == GRID_DIMENSION - 1 && blocked > 0 {
                        let mut reads: Vec<&str> = eq
                            .slots
                            .iter()
                            .filter_map(|s| {
                                self.fields().iter().find(|f| f.id == s.field)
                            })
                            .map(|f| f.name.as_str())
                            .collect();
                        reads.sort_unstable();
                        reads.dedup();
                        w.line(&format!(
                            "#pragma omp simd aligned({}:64)",
                            reads.join(",")
                        ));
                    }
                    w.line(&format!("for (int {n} = {n}_m; {n} <= {n}_M; {n} += 1)"));
                }
                w.open();
                opened += 1;
            }
            let access = |a: &Access<GRID_DIMENSION>| self.c_access(a, &loop_vars);
            let rhs = c_expr(dtype, &eq.rhs, &access, "0");
            w.line(&format!("{} = {};", self.c_access(&eq.lhs, &loop_vars), rhs));
            for _ in 0..opened {
                w.close();
            }
            w.close();
            w.line(&format!("STOP(section{section},timers)"));
            w.line("");
            section += 1;
        }

        for inj in &self.injections {
            let src = inj.injection.source_name();
            w.line(&format!("START(section{section})"));
            w.line("#pragma omp parallel num_threads(nthreads)");
            w.open();
            w.line("#pragma omp for schedule(dynamic,1)");
            w.line(&format!(
                "for (int p_{src} = p_{src}_m; p_{src} <= p_{src}_M; p_{src} += 1)"
            ));
            w.open();
            let bases: Vec<String> =
                (0..GRID_DIMENSION).map(|d| format!("ii_{src}_{d}")).collect();
            for (d, n) in names.iter().enumerate() {
                w.line(&format!(
                    "{real} pos_{n} = (-o_{n} + {src}_coords[p_{src}][{d}])/h_{n};"
                ));
                w.line(&format!("int {} = (int)(floor(pos_{n}));", bases[d]));
                w.line(&format!("{real} p{n} = pos_{n} - {};", bases[d]));
            }
            for mask in 0..(1usize << GRID_DIMENSION) {
                let corner: Vec<String> = (0..GRID_DIMENSION)
                    .map(|d| {
                        if (mask >> d) & 1 == 1 {
                            format!("{} + 1", bases[d])
                        } else {
                            bases[d].clone()
                        }
                    })
                    .collect();
                let guard: Vec<String> = names
                    .iter()
                    .zip(corner.iter())
                    .map(|(n, c)| format!("{c} >= {n}_m && {c} <= {n}_M"))
                    .collect();
                let weight: Vec<String> = names
                    .iter()
                    .enumerate()
                    .map(|(d, n)| {
                        if (mask >> d) & 1 == 1 {
                            format!("p{n}")
                        } else {
                            format!("(1 - p{n})")
                        }
                    })
                    .collect();
                w.line(&format!("if ({})", guard.join(" && ")));
                w.open();
                let access = |a: &Access<GRID_DIMENSION>| self.c_access(a, &corner);
                let value = c_expr(dtype, &inj.expr, &access, &format!("{src}[time][p_{src}]"));
                w.line(&format!("{real} r{mask} = {}*({value});", weight.join("*")));
                w.line("#pragma omp atomic update");
                w.line(&format!("{} += r{mask};", self.c_access(inj.injection.target(), &corner)));
                w.close();
            }
            w.close();
            w.close();
            w.line(&format!("STOP(section{section},timers)"));
            w.line("");
            section += 1;
        }

        w.close();
        w.line("");
        w.line("return 0;");
        w.close();
        w.out
    }

    /// Write `ccode()` to `path`.
    pub fn write_ccode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.ccode())?;
        log::info!(
            "wrote generated code of `{}` to {}",
            self.name(),
            path.as_ref().display()
        );
        Ok(())
    }
}
