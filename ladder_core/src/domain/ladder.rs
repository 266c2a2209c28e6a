//! 梯形图指令行（IL 形式）。
//!
//! 生成的程序是一条扁平、有序的指令序列；控制器加载器对顺序敏感，
//! 因此这里只提供追加操作，不提供插入/重排。

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Opcode {
    Ld,
    Ldi,
    And,
    Ani,
    Or,
    Ori,
    Anb,
    Orb,
    Mps,
    Mrd,
    Mpp,
    Out,
    Set,
    Rst,
    Pls,
    Plf,
    Inc,
    Mov,
    Bmov,
    Fmov,
    Sub,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Ld => "LD",
            Opcode::Ldi => "LDI",
            Opcode::And => "AND",
            Opcode::Ani => "ANI",
            Opcode::Or => "OR",
            Opcode::Ori => "ORI",
            Opcode::Anb => "ANB",
            Opcode::Orb => "ORB",
            Opcode::Mps => "MPS",
            Opcode::Mrd => "MRD",
            Opcode::Mpp => "MPP",
            Opcode::Out => "OUT",
            Opcode::Set => "SET",
            Opcode::Rst => "RST",
            Opcode::Pls => "PLS",
            Opcode::Plf => "PLF",
            Opcode::Inc => "INC",
            Opcode::Mov => "MOV",
            Opcode::Bmov => "BMOV",
            Opcode::Fmov => "FMOV",
            Opcode::Sub => "SUB",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// 行首：语句（注释行）或指令
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RowHead {
    Statement(String),
    Instruction(Opcode),
}

/// 一行梯形图：(statement-or-opcode, operand₁, operand₂, …)，构造后不可变
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstructionRow {
    head: RowHead,
    operands: Vec<String>,
}

impl InstructionRow {
    pub fn statement(text: impl Into<String>) -> Self {
        Self {
            head: RowHead::Statement(text.into()),
            operands: Vec::new(),
        }
    }

    pub fn instruction(opcode: Opcode, operands: Vec<String>) -> Self {
        Self {
            head: RowHead::Instruction(opcode),
            operands,
        }
    }

    pub fn head(&self) -> &RowHead {
        &self.head
    }

    pub fn opcode(&self) -> Option<Opcode> {
        match self.head {
            RowHead::Instruction(op) => Some(op),
            RowHead::Statement(_) => None,
        }
    }

    pub fn operands(&self) -> &[String] {
        &self.operands
    }

    /// 首列文本：语句原文或指令助记符
    pub fn head_text(&self) -> &str {
        match &self.head {
            RowHead::Statement(text) => text,
            RowHead::Instruction(op) => op.mnemonic(),
        }
    }

    /// 固定列宽：首列 + `operand_columns` 个操作数列（不足补空，超出截断）
    pub fn columns(&self, operand_columns: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(operand_columns + 1);
        out.push(self.head_text().to_string());
        for i in 0..operand_columns {
            out.push(self.operands.get(i).cloned().unwrap_or_default());
        }
        out
    }
}

impl fmt::Display for InstructionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.head_text())?;
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

/// 追加式指令缓冲：builder 通过它按顺序产出指令行
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LadderRows {
    rows: Vec<InstructionRow>,
}

impl LadderRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[InstructionRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<InstructionRow> {
        self.rows
    }

    pub fn statement(&mut self, text: impl Into<String>) -> &mut Self {
        self.rows.push(InstructionRow::statement(text));
        self
    }

    fn push(&mut self, opcode: Opcode, operands: Vec<String>) -> &mut Self {
        self.rows.push(InstructionRow::instruction(opcode, operands));
        self
    }

    pub fn ld(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Ld, vec![operand.to_string()])
    }

    pub fn ldi(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Ldi, vec![operand.to_string()])
    }

    pub fn and(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::And, vec![operand.to_string()])
    }

    pub fn ani(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Ani, vec![operand.to_string()])
    }

    pub fn or(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Or, vec![operand.to_string()])
    }

    pub fn ori(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Ori, vec![operand.to_string()])
    }

    pub fn anb(&mut self) -> &mut Self {
        self.push(Opcode::Anb, Vec::new())
    }

    pub fn orb(&mut self) -> &mut Self {
        self.push(Opcode::Orb, Vec::new())
    }

    pub fn mps(&mut self) -> &mut Self {
        self.push(Opcode::Mps, Vec::new())
    }

    pub fn mrd(&mut self) -> &mut Self {
        self.push(Opcode::Mrd, Vec::new())
    }

    pub fn mpp(&mut self) -> &mut Self {
        self.push(Opcode::Mpp, Vec::new())
    }

    pub fn out(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Out, vec![operand.to_string()])
    }

    /// OUT Tn <设定值>
    pub fn out_timer(
        &mut self,
        timer: impl fmt::Display,
        set_value: impl fmt::Display,
    ) -> &mut Self {
        self.push(Opcode::Out, vec![timer.to_string(), set_value.to_string()])
    }

    pub fn set(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Set, vec![operand.to_string()])
    }

    pub fn rst(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Rst, vec![operand.to_string()])
    }

    pub fn pls(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Pls, vec![operand.to_string()])
    }

    pub fn plf(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Plf, vec![operand.to_string()])
    }

    pub fn inc(&mut self, operand: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Inc, vec![operand.to_string()])
    }

    pub fn mov(&mut self, source: impl fmt::Display, dest: impl fmt::Display) -> &mut Self {
        self.push(Opcode::Mov, vec![source.to_string(), dest.to_string()])
    }

    pub fn bmov(
        &mut self,
        source: impl fmt::Display,
        dest: impl fmt::Display,
        count: impl fmt::Display,
    ) -> &mut Self {
        self.push(
            Opcode::Bmov,
            vec![source.to_string(), dest.to_string(), count.to_string()],
        )
    }

    pub fn fmov(
        &mut self,
        source: impl fmt::Display,
        dest: impl fmt::Display,
        count: impl fmt::Display,
    ) -> &mut Self {
        self.push(
            Opcode::Fmov,
            vec![source.to_string(), dest.to_string(), count.to_string()],
        )
    }

    /// SUB s1 s2 d：d = s1 - s2
    pub fn sub(
        &mut self,
        minuend: impl fmt::Display,
        subtrahend: impl fmt::Display,
        dest: impl fmt::Display,
    ) -> &mut Self {
        self.push(
            Opcode::Sub,
            vec![minuend.to_string(), subtrahend.to_string(), dest.to_string()],
        )
    }

    /// 按顺序把若干接点接入当前回路：第一个用 LD，其余用 `join`（AND/OR）
    pub fn contacts<I, D>(&mut self, contacts: I, join: Opcode) -> usize
    where
        I: IntoIterator<Item = D>,
        D: fmt::Display,
    {
        let mut count = 0;
        for contact in contacts {
            let opcode = if count == 0 { Opcode::Ld } else { join };
            self.push(opcode, vec![contact.to_string()]);
            count += 1;
        }
        count
    }
}
