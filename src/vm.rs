use std::fmt::{self, Display, Formatter};

/// A VM memory segment as named in the instruction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    This,
    That,
    Pointer,
    Temp,
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Constant => "constant",
            Segment::Argument => "argument",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
        };
        f.write_str(name)
    }
}

/// One line of VM instruction text. `Display` renders exactly the line the
/// VM expects, so a program is just instructions joined with newlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Function {
        class: String,
        name: String,
        locals: u16,
    },
    Push(Segment, u16),
    Pop(Segment, u16),
    Add,
    Sub,
    Neg,
    And,
    Or,
    Not,
    Lt,
    Gt,
    Eq,
    Label(String),
    Goto(String),
    IfGoto(String),
    Call {
        class: String,
        name: String,
        args: u16,
    },
    Return,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Function {
                class,
                name,
                locals,
            } => write!(f, "function {class}.{name} {locals}"),
            Instruction::Push(segment, index) => write!(f, "push {segment} {index}"),
            Instruction::Pop(segment, index) => write!(f, "pop {segment} {index}"),
            Instruction::Add => f.write_str("add"),
            Instruction::Sub => f.write_str("sub"),
            Instruction::Neg => f.write_str("neg"),
            Instruction::And => f.write_str("and"),
            Instruction::Or => f.write_str("or"),
            Instruction::Not => f.write_str("not"),
            Instruction::Lt => f.write_str("lt"),
            Instruction::Gt => f.write_str("gt"),
            Instruction::Eq => f.write_str("eq"),
            Instruction::Label(label) => write!(f, "label {label}"),
            Instruction::Goto(label) => write!(f, "goto {label}"),
            Instruction::IfGoto(label) => write!(f, "if-goto {label}"),
            Instruction::Call { class, name, args } => write!(f, "call {class}.{name} {args}"),
            Instruction::Return => f.write_str("return"),
        }
    }
}

/// Render a compiled instruction sequence as newline-separated text.
pub fn render(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
