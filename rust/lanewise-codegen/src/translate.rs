//! Translation of one wasm function body into Cranelift IR.
//!
//! The translator is generic over a [`VectorLowering`]; everything that is
//! not a vector operation (locals, globals, scalar arithmetic, calls and
//! trap propagation) is shared between the lowering modes.
//!
//! Traps do not unwind. A trapping instruction stores its code into the
//! context block and branches to the function's trap exit, which returns
//! zero values. Every call site checks the trap slot on return and, if it is
//! set, exits the same way, so a trap anywhere unwinds to the host entry
//! trampoline which reports it.

use std::marker::PhantomData;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::immediates::{Ieee32, Ieee64};
use cranelift_codegen::ir::{self, types, Block, InstBuilder, Type as ClifType, Value};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use wasmparser::Operator;

use crate::decode::{FuncSig, ModuleInfo};
use crate::error::{CodegenError, TrapCode};
use crate::types::{slot_flags, value_parts};
use crate::val::ValType;
use crate::vector::{Binop, Shape, Unop, VectorLowering};
use crate::vmctx::{global_offset, TRAP_OFFSET};

/// An operand stack entry.
#[derive(Clone, Copy)]
enum Operand<R> {
    Scalar(Value),
    Vector(R),
}

struct Local {
    ty: ValType,
    vars: Vec<Variable>,
}

/// Zero constant of one Cranelift part type.
pub(crate) fn zero_part(b: &mut FunctionBuilder, ty: ClifType) -> Value {
    if ty.is_vector() {
        let handle = b
            .func
            .dfg
            .constants
            .insert(ir::ConstantData::from(&[0u8; 16][..]));
        b.ins().vconst(ty, handle)
    } else if ty == types::F32 {
        b.ins().f32const(Ieee32::with_bits(0))
    } else if ty == types::F64 {
        b.ins().f64const(Ieee64::with_bits(0))
    } else {
        b.ins().iconst(ty, 0)
    }
}

fn unsupported(op: &Operator<'_>) -> CodegenError {
    CodegenError::Unsupported(format!("operator {op:?}"))
}

pub(crate) struct FunctionTranslator<'a, 'f, L: VectorLowering> {
    builder: FunctionBuilder<'f>,
    info: &'a ModuleInfo<'a>,
    callees: &'a [ir::FuncRef],
    sig: &'a FuncSig,
    vmctx: Value,
    locals: Vec<Local>,
    stack: Vec<Operand<L::Repr>>,
    trap_exit: Option<Block>,
    _lowering: PhantomData<L>,
}

/// Translate function `index` of `info` into `func`, whose signature must
/// already be set. `callees[i]` is the reference to function `i` imported
/// into `func`.
pub(crate) fn translate_function<L: VectorLowering>(
    info: &ModuleInfo<'_>,
    index: usize,
    callees: &[ir::FuncRef],
    func: &mut ir::Function,
    fb_ctx: &mut FunctionBuilderContext,
) -> Result<(), CodegenError> {
    let sig = info
        .signatures
        .get(index)
        .ok_or(CodegenError::UnknownFunction(index as u32))?;
    let code = info
        .code
        .get(index)
        .ok_or(CodegenError::UnknownFunction(index as u32))?;

    let mut builder = FunctionBuilder::new(func, fb_ctx);
    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    let params = builder.block_params(entry).to_vec();
    let vmctx = params[0];

    // Locals: parameters first, then declared locals, each as one variable
    // per part.
    let mut locals = Vec::new();
    let mut next_var = 0u32;
    let mut param_values = params[1..].iter().copied();
    for (n, ty) in sig.params.iter().chain(code.locals.iter()).enumerate() {
        let mut vars = Vec::new();
        for part in value_parts::<L>(*ty) {
            let var = Variable::from_u32(next_var);
            next_var += 1;
            builder.declare_var(var, *part);
            let init = if n < sig.params.len() {
                param_values.next().ok_or_else(|| {
                    CodegenError::Lowering("signature has fewer parameters than declared".into())
                })?
            } else {
                zero_part(&mut builder, *part)
            };
            builder.def_var(var, init);
            vars.push(var);
        }
        locals.push(Local { ty: *ty, vars });
    }

    let mut translator = FunctionTranslator::<L> {
        builder,
        info,
        callees,
        sig,
        vmctx,
        locals,
        stack: Vec::new(),
        trap_exit: None,
        _lowering: PhantomData,
    };
    translator.translate_body(&code.operators)?;
    translator.finish();
    Ok(())
}

impl<'a, 'f, L: VectorLowering> FunctionTranslator<'a, 'f, L> {
    // ---------------------------------------------------------------------
    // Operand stack
    // ---------------------------------------------------------------------

    fn pop(&mut self) -> Result<Operand<L::Repr>, CodegenError> {
        self.stack
            .pop()
            .ok_or_else(|| CodegenError::Lowering("operand stack underflow".into()))
    }

    fn pop_scalar(&mut self) -> Result<Value, CodegenError> {
        match self.pop()? {
            Operand::Scalar(v) => Ok(v),
            Operand::Vector(_) => Err(CodegenError::Lowering(
                "expected a scalar operand, found a vector".into(),
            )),
        }
    }

    fn pop_vector(&mut self) -> Result<L::Repr, CodegenError> {
        match self.pop()? {
            Operand::Vector(v) => Ok(v),
            Operand::Scalar(_) => Err(CodegenError::Lowering(
                "expected a vector operand, found a scalar".into(),
            )),
        }
    }

    fn push_scalar(&mut self, v: Value) {
        self.stack.push(Operand::Scalar(v));
    }

    fn push_vector(&mut self, v: L::Repr) {
        self.stack.push(Operand::Vector(v));
    }

    fn flatten(operand: Operand<L::Repr>) -> Vec<Value> {
        match operand {
            Operand::Scalar(v) => vec![v],
            Operand::Vector(v) => L::parts(v),
        }
    }

    /// Rebuild operands of `tys` from a flat list of parts.
    fn regroup(tys: &[ValType], parts: &[Value]) -> Vec<Operand<L::Repr>> {
        let mut out = Vec::with_capacity(tys.len());
        let mut at = 0;
        for ty in tys {
            let n = value_parts::<L>(*ty).len();
            let chunk = &parts[at..at + n];
            at += n;
            out.push(match ty {
                ValType::V128 => Operand::Vector(L::assemble(chunk)),
                _ => Operand::Scalar(chunk[0]),
            });
        }
        out
    }

    // ---------------------------------------------------------------------
    // Traps
    // ---------------------------------------------------------------------

    fn trap_exit(&mut self) -> Block {
        match self.trap_exit {
            Some(block) => block,
            None => {
                let block = self.builder.create_block();
                self.builder.set_cold_block(block);
                self.trap_exit = Some(block);
                block
            }
        }
    }

    /// Record `code` and leave the function when `cond` is nonzero.
    fn trap_if(&mut self, cond: Value, code: TrapCode) {
        let exit = self.trap_exit();
        let raise = self.builder.create_block();
        let cont = self.builder.create_block();
        self.builder.set_cold_block(raise);
        self.builder.ins().brif(cond, raise, &[], cont, &[]);

        self.builder.switch_to_block(raise);
        let raw = self.builder.ins().iconst(types::I32, i64::from(code.raw()));
        self.builder
            .ins()
            .store(slot_flags(), raw, self.vmctx, TRAP_OFFSET);
        self.builder.ins().jump(exit, &[]);

        self.builder.switch_to_block(cont);
    }

    /// After a call: leave the function if the callee trapped.
    fn propagate_trap(&mut self) {
        let exit = self.trap_exit();
        let cont = self.builder.create_block();
        let pending = self
            .builder
            .ins()
            .load(types::I32, slot_flags(), self.vmctx, TRAP_OFFSET);
        self.builder.ins().brif(pending, exit, &[], cont, &[]);
        self.builder.switch_to_block(cont);
    }

    fn return_zeros(&mut self) {
        let mut values = Vec::new();
        for ty in &self.sig.results {
            for part in value_parts::<L>(*ty) {
                values.push(zero_part(&mut self.builder, *part));
            }
        }
        self.builder.ins().return_(&values);
    }

    // ---------------------------------------------------------------------
    // Body
    // ---------------------------------------------------------------------

    fn translate_body(&mut self, operators: &[Operator<'_>]) -> Result<(), CodegenError> {
        let mut returned = false;
        for op in operators {
            if returned {
                // Only the closing `end` may follow an early `return`.
                match op {
                    Operator::End => break,
                    _ => continue,
                }
            }
            match op {
                Operator::End | Operator::Return => {
                    self.emit_return()?;
                    returned = true;
                }
                _ => self.translate_operator(op)?,
            }
        }
        if !returned {
            return Err(CodegenError::Lowering("function body has no end".into()));
        }
        Ok(())
    }

    fn emit_return(&mut self) -> Result<(), CodegenError> {
        let n = self.sig.results.len();
        if self.stack.len() < n {
            return Err(CodegenError::Lowering(format!(
                "{} results expected, {} on the stack",
                n,
                self.stack.len()
            )));
        }
        let operands = self.stack.split_off(self.stack.len() - n);
        let values: Vec<Value> = operands.into_iter().flat_map(Self::flatten).collect();
        self.builder.ins().return_(&values);
        Ok(())
    }

    fn finish(mut self) {
        if let Some(exit) = self.trap_exit {
            self.builder.switch_to_block(exit);
            self.return_zeros();
        }
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }

    fn translate_operator(&mut self, op: &Operator<'_>) -> Result<(), CodegenError> {
        match *op {
            Operator::Nop => {}
            Operator::Drop => {
                self.pop()?;
            }

            // ---- locals and globals ----
            Operator::LocalGet { local_index } => {
                let operand = self.read_local(local_index)?;
                self.stack.push(operand);
            }
            Operator::LocalSet { local_index } => {
                let operand = self.pop()?;
                self.write_local(local_index, operand)?;
            }
            Operator::LocalTee { local_index } => {
                let operand = self.pop()?;
                self.write_local(local_index, operand)?;
                self.stack.push(operand);
            }
            Operator::GlobalGet { global_index } => {
                let ty = self.global_type(global_index)?;
                let offset = global_offset(global_index);
                match ty {
                    ValType::V128 => {
                        let v = L::load(&mut self.builder, self.vmctx, offset);
                        self.push_vector(v);
                    }
                    scalar => {
                        let clif = value_parts::<L>(scalar)[0];
                        let v = self
                            .builder
                            .ins()
                            .load(clif, slot_flags(), self.vmctx, offset);
                        self.push_scalar(v);
                    }
                }
            }
            Operator::GlobalSet { global_index } => {
                self.global_type(global_index)?;
                let offset = global_offset(global_index);
                match self.pop()? {
                    Operand::Vector(v) => L::store(&mut self.builder, v, self.vmctx, offset),
                    Operand::Scalar(v) => {
                        self.builder
                            .ins()
                            .store(slot_flags(), v, self.vmctx, offset);
                    }
                }
            }

            // ---- constants ----
            Operator::I32Const { value } => {
                let v = self
                    .builder
                    .ins()
                    .iconst(types::I32, i64::from(value as u32));
                self.push_scalar(v);
            }
            Operator::I64Const { value } => {
                let v = self.builder.ins().iconst(types::I64, value);
                self.push_scalar(v);
            }
            Operator::F32Const { value } => {
                let v = self.builder.ins().f32const(Ieee32::with_bits(value.bits()));
                self.push_scalar(v);
            }
            Operator::F64Const { value } => {
                let v = self.builder.ins().f64const(Ieee64::with_bits(value.bits()));
                self.push_scalar(v);
            }
            Operator::V128Const { value } => {
                let v = L::constant(&mut self.builder, *value.bytes());
                self.push_vector(v);
            }

            // ---- calls ----
            Operator::Call { function_index } => self.translate_call(function_index)?,

            // ---- scalar i32 ----
            Operator::I32Add => self.int_binop(|b, x, y| b.ins().iadd(x, y))?,
            Operator::I32Sub => self.int_binop(|b, x, y| b.ins().isub(x, y))?,
            Operator::I32Mul => self.int_binop(|b, x, y| b.ins().imul(x, y))?,
            Operator::I32And => self.int_binop(|b, x, y| b.ins().band(x, y))?,
            Operator::I32Or => self.int_binop(|b, x, y| b.ins().bor(x, y))?,
            Operator::I32Xor => self.int_binop(|b, x, y| b.ins().bxor(x, y))?,
            Operator::I32Eq => self.int_binop(|b, x, y| {
                let flag = b.ins().icmp(IntCC::Equal, x, y);
                b.ins().uextend(types::I32, flag)
            })?,
            Operator::I32Ne => self.int_binop(|b, x, y| {
                let flag = b.ins().icmp(IntCC::NotEqual, x, y);
                b.ins().uextend(types::I32, flag)
            })?,
            Operator::I32Eqz => {
                let x = self.pop_scalar()?;
                let flag = self.builder.ins().icmp_imm(IntCC::Equal, x, 0);
                let v = self.builder.ins().uextend(types::I32, flag);
                self.push_scalar(v);
            }
            Operator::I32DivS => {
                let y = self.pop_scalar()?;
                let x = self.pop_scalar()?;
                let zero = self.builder.ins().icmp_imm(IntCC::Equal, y, 0);
                self.trap_if(zero, TrapCode::IntegerDivisionByZero);
                let int_min = self
                    .builder
                    .ins()
                    .iconst(types::I32, i64::from(i32::MIN as u32));
                let minus_one = self.builder.ins().iconst(types::I32, i64::from(u32::MAX));
                let lhs_min = self.builder.ins().icmp(IntCC::Equal, x, int_min);
                let rhs_minus_one = self.builder.ins().icmp(IntCC::Equal, y, minus_one);
                let overflow = self.builder.ins().band(lhs_min, rhs_minus_one);
                self.trap_if(overflow, TrapCode::IntegerOverflow);
                let v = self.builder.ins().sdiv(x, y);
                self.push_scalar(v);
            }
            Operator::I32DivU => {
                let y = self.pop_scalar()?;
                let x = self.pop_scalar()?;
                let zero = self.builder.ins().icmp_imm(IntCC::Equal, y, 0);
                self.trap_if(zero, TrapCode::IntegerDivisionByZero);
                let v = self.builder.ins().udiv(x, y);
                self.push_scalar(v);
            }

            // ---- vectors ----
            Operator::I8x16Splat => self.splat(Shape::I8x16)?,
            Operator::I16x8Splat => self.splat(Shape::I16x8)?,
            Operator::I32x4Splat => self.splat(Shape::I32x4)?,
            Operator::F32x4Splat => self.splat(Shape::F32x4)?,

            Operator::I8x16ExtractLaneS { lane } => self.extract(Shape::I8x16, lane, true)?,
            Operator::I8x16ExtractLaneU { lane } => self.extract(Shape::I8x16, lane, false)?,
            Operator::I16x8ExtractLaneS { lane } => self.extract(Shape::I16x8, lane, true)?,
            Operator::I16x8ExtractLaneU { lane } => self.extract(Shape::I16x8, lane, false)?,
            Operator::I32x4ExtractLane { lane } => self.extract(Shape::I32x4, lane, false)?,
            Operator::F32x4ExtractLane { lane } => self.extract(Shape::F32x4, lane, false)?,

            Operator::I8x16ReplaceLane { lane } => self.replace(Shape::I8x16, lane)?,
            Operator::I16x8ReplaceLane { lane } => self.replace(Shape::I16x8, lane)?,
            Operator::I32x4ReplaceLane { lane } => self.replace(Shape::I32x4, lane)?,
            Operator::F32x4ReplaceLane { lane } => self.replace(Shape::F32x4, lane)?,

            Operator::I8x16Neg => self.unary(Unop::Neg(Shape::I8x16))?,
            Operator::I16x8Neg => self.unary(Unop::Neg(Shape::I16x8))?,
            Operator::I32x4Neg => self.unary(Unop::Neg(Shape::I32x4))?,
            Operator::F32x4Neg => self.unary(Unop::Neg(Shape::F32x4))?,
            Operator::F32x4Abs => self.unary(Unop::FAbs)?,
            Operator::F32x4Sqrt => self.unary(Unop::FSqrt)?,
            Operator::V128Not => self.unary(Unop::Not)?,

            Operator::I8x16Add => self.binary(Binop::Add(Shape::I8x16))?,
            Operator::I8x16Sub => self.binary(Binop::Sub(Shape::I8x16))?,
            Operator::I8x16Eq => self.binary(Binop::Eq(Shape::I8x16))?,
            Operator::I8x16Ne => self.binary(Binop::Ne(Shape::I8x16))?,
            Operator::I16x8Add => self.binary(Binop::Add(Shape::I16x8))?,
            Operator::I16x8Sub => self.binary(Binop::Sub(Shape::I16x8))?,
            Operator::I16x8Mul => self.binary(Binop::Mul(Shape::I16x8))?,
            Operator::I16x8Eq => self.binary(Binop::Eq(Shape::I16x8))?,
            Operator::I16x8Ne => self.binary(Binop::Ne(Shape::I16x8))?,
            Operator::I32x4Add => self.binary(Binop::Add(Shape::I32x4))?,
            Operator::I32x4Sub => self.binary(Binop::Sub(Shape::I32x4))?,
            Operator::I32x4Mul => self.binary(Binop::Mul(Shape::I32x4))?,
            Operator::I32x4Eq => self.binary(Binop::Eq(Shape::I32x4))?,
            Operator::I32x4Ne => self.binary(Binop::Ne(Shape::I32x4))?,
            Operator::F32x4Add => self.binary(Binop::Add(Shape::F32x4))?,
            Operator::F32x4Sub => self.binary(Binop::Sub(Shape::F32x4))?,
            Operator::F32x4Mul => self.binary(Binop::Mul(Shape::F32x4))?,
            Operator::F32x4Div => self.binary(Binop::FDiv)?,
            Operator::F32x4Min => self.binary(Binop::FMin)?,
            Operator::F32x4Max => self.binary(Binop::FMax)?,
            Operator::F32x4Eq => self.binary(Binop::Eq(Shape::F32x4))?,
            Operator::F32x4Ne => self.binary(Binop::Ne(Shape::F32x4))?,
            Operator::V128And => self.binary(Binop::And)?,
            Operator::V128Or => self.binary(Binop::Or)?,
            Operator::V128Xor => self.binary(Binop::Xor)?,

            Operator::I8x16AllTrue => self.all_true(Shape::I8x16)?,
            Operator::I16x8AllTrue => self.all_true(Shape::I16x8)?,
            Operator::I32x4AllTrue => self.all_true(Shape::I32x4)?,
            Operator::V128AnyTrue => {
                let v = self.pop_vector()?;
                let r = L::any_true(&mut self.builder, v);
                self.push_scalar(r);
            }

            ref other => return Err(unsupported(other)),
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn local(&self, index: u32) -> Result<&Local, CodegenError> {
        self.locals
            .get(index as usize)
            .ok_or_else(|| CodegenError::Lowering(format!("local {index} out of range")))
    }

    fn read_local(&mut self, index: u32) -> Result<Operand<L::Repr>, CodegenError> {
        let local = self.local(index)?;
        let (ty, vars) = (local.ty, local.vars.clone());
        let values: Vec<Value> = vars.iter().map(|v| self.builder.use_var(*v)).collect();
        Ok(match ty {
            ValType::V128 => Operand::Vector(L::assemble(&values)),
            _ => Operand::Scalar(values[0]),
        })
    }

    fn write_local(&mut self, index: u32, operand: Operand<L::Repr>) -> Result<(), CodegenError> {
        let vars = self.local(index)?.vars.clone();
        let values = Self::flatten(operand);
        if values.len() != vars.len() {
            return Err(CodegenError::Lowering(format!(
                "local {index} written with a value of the wrong type"
            )));
        }
        for (var, value) in vars.iter().zip(values) {
            self.builder.def_var(*var, value);
        }
        Ok(())
    }

    fn global_type(&self, index: u32) -> Result<ValType, CodegenError> {
        self.info
            .globals
            .get(index as usize)
            .map(|g| g.ty)
            .ok_or(CodegenError::UnknownGlobal(index))
    }

    fn translate_call(&mut self, function_index: u32) -> Result<(), CodegenError> {
        let callee_sig = self
            .info
            .signatures
            .get(function_index as usize)
            .ok_or(CodegenError::UnknownFunction(function_index))?;
        let callee = *self
            .callees
            .get(function_index as usize)
            .ok_or(CodegenError::UnknownFunction(function_index))?;

        let n = callee_sig.params.len();
        if self.stack.len() < n {
            return Err(CodegenError::Lowering(format!(
                "call to {function_index} needs {n} arguments"
            )));
        }
        let operands = self.stack.split_off(self.stack.len() - n);
        let mut args = vec![self.vmctx];
        args.extend(operands.into_iter().flat_map(Self::flatten));

        let call = self.builder.ins().call(callee, &args);
        let results = self.builder.inst_results(call).to_vec();
        self.propagate_trap();
        let regrouped = Self::regroup(&callee_sig.results, &results);
        self.stack.extend(regrouped);
        Ok(())
    }

    fn int_binop(
        &mut self,
        f: impl FnOnce(&mut FunctionBuilder<'f>, Value, Value) -> Value,
    ) -> Result<(), CodegenError> {
        let y = self.pop_scalar()?;
        let x = self.pop_scalar()?;
        let v = f(&mut self.builder, x, y);
        self.push_scalar(v);
        Ok(())
    }

    fn splat(&mut self, shape: Shape) -> Result<(), CodegenError> {
        let x = self.pop_scalar()?;
        let v = L::splat(&mut self.builder, shape, x);
        self.push_vector(v);
        Ok(())
    }

    fn extract(&mut self, shape: Shape, lane: u8, signed: bool) -> Result<(), CodegenError> {
        let v = self.pop_vector()?;
        let x = L::extract_lane(&mut self.builder, shape, lane, signed, v);
        self.push_scalar(x);
        Ok(())
    }

    fn replace(&mut self, shape: Shape, lane: u8) -> Result<(), CodegenError> {
        let x = self.pop_scalar()?;
        let v = self.pop_vector()?;
        let r = L::replace_lane(&mut self.builder, shape, lane, v, x);
        self.push_vector(r);
        Ok(())
    }

    fn unary(&mut self, op: Unop) -> Result<(), CodegenError> {
        let v = self.pop_vector()?;
        let r = L::unary(&mut self.builder, op, v);
        self.push_vector(r);
        Ok(())
    }

    fn binary(&mut self, op: Binop) -> Result<(), CodegenError> {
        let y = self.pop_vector()?;
        let x = self.pop_vector()?;
        let r = L::binary(&mut self.builder, op, x, y);
        self.push_vector(r);
        Ok(())
    }

    fn all_true(&mut self, shape: Shape) -> Result<(), CodegenError> {
        let v = self.pop_vector()?;
        let r = L::all_true(&mut self.builder, shape, v);
        self.push_scalar(r);
        Ok(())
    }
}
