//! JVM opcode byte constants and per-opcode metadata (JVMS chapter 6).
//!
//! Each opcode is a `u8` constant named after its mnemonic (e.g. [`INVOKEVIRTUAL`] =
//! `0xB6`). [`info`] returns the mnemonic, whether the opcode is a plain operand-less
//! operation, and its stack effect in words. Opcodes whose effect depends on a descriptor
//! (field access, invocations, `multianewarray`) report [`StackEffect::Variable`].
#![allow(missing_docs)]

/// Operand stack effect of an opcode, counted in words (category-2 values count twice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// Pops and pushes a fixed number of words
    Fixed { pops: u8, pushes: u8 },
    /// Depends on the operand's descriptor
    Variable,
}

/// Static metadata of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Lower-case mnemonic
    pub mnemonic: &'static str,
    /// `true` if the opcode has no operands and is modeled as a plain operation
    pub simple: bool,
    /// Operand stack effect
    pub stack: StackEffect,
}

const fn fixed(pops: u8, pushes: u8) -> StackEffect {
    StackEffect::Fixed { pops, pushes }
}

const VARIABLE: StackEffect = StackEffect::Variable;

macro_rules! opcodes {
    ($($name:ident = $value:literal, $mnemonic:literal, $simple:literal, $stack:expr;)*) => {
        $(pub const $name: u8 = $value;)*

        /// Metadata for `opcode`, or `None` if the byte is not a defined opcode.
        #[must_use]
        pub fn info(opcode: u8) -> Option<OpcodeInfo> {
            match opcode {
                $($value => Some(OpcodeInfo {
                    mnemonic: $mnemonic,
                    simple: $simple,
                    stack: $stack,
                }),)*
                _ => None,
            }
        }
    };
}

opcodes! {
    // Constants
    NOP = 0x00, "nop", true, fixed(0, 0);
    ACONST_NULL = 0x01, "aconst_null", true, fixed(0, 1);
    ICONST_M1 = 0x02, "iconst_m1", false, fixed(0, 1);
    ICONST_0 = 0x03, "iconst_0", false, fixed(0, 1);
    ICONST_1 = 0x04, "iconst_1", false, fixed(0, 1);
    ICONST_2 = 0x05, "iconst_2", false, fixed(0, 1);
    ICONST_3 = 0x06, "iconst_3", false, fixed(0, 1);
    ICONST_4 = 0x07, "iconst_4", false, fixed(0, 1);
    ICONST_5 = 0x08, "iconst_5", false, fixed(0, 1);
    LCONST_0 = 0x09, "lconst_0", false, fixed(0, 2);
    LCONST_1 = 0x0A, "lconst_1", false, fixed(0, 2);
    FCONST_0 = 0x0B, "fconst_0", false, fixed(0, 1);
    FCONST_1 = 0x0C, "fconst_1", false, fixed(0, 1);
    FCONST_2 = 0x0D, "fconst_2", false, fixed(0, 1);
    DCONST_0 = 0x0E, "dconst_0", false, fixed(0, 2);
    DCONST_1 = 0x0F, "dconst_1", false, fixed(0, 2);
    BIPUSH = 0x10, "bipush", false, fixed(0, 1);
    SIPUSH = 0x11, "sipush", false, fixed(0, 1);
    LDC = 0x12, "ldc", false, fixed(0, 1);
    LDC_W = 0x13, "ldc_w", false, fixed(0, 1);
    LDC2_W = 0x14, "ldc2_w", false, fixed(0, 2);

    // Loads
    ILOAD = 0x15, "iload", false, fixed(0, 1);
    LLOAD = 0x16, "lload", false, fixed(0, 2);
    FLOAD = 0x17, "fload", false, fixed(0, 1);
    DLOAD = 0x18, "dload", false, fixed(0, 2);
    ALOAD = 0x19, "aload", false, fixed(0, 1);
    ILOAD_0 = 0x1A, "iload_0", false, fixed(0, 1);
    ILOAD_1 = 0x1B, "iload_1", false, fixed(0, 1);
    ILOAD_2 = 0x1C, "iload_2", false, fixed(0, 1);
    ILOAD_3 = 0x1D, "iload_3", false, fixed(0, 1);
    LLOAD_0 = 0x1E, "lload_0", false, fixed(0, 2);
    LLOAD_1 = 0x1F, "lload_1", false, fixed(0, 2);
    LLOAD_2 = 0x20, "lload_2", false, fixed(0, 2);
    LLOAD_3 = 0x21, "lload_3", false, fixed(0, 2);
    FLOAD_0 = 0x22, "fload_0", false, fixed(0, 1);
    FLOAD_1 = 0x23, "fload_1", false, fixed(0, 1);
    FLOAD_2 = 0x24, "fload_2", false, fixed(0, 1);
    FLOAD_3 = 0x25, "fload_3", false, fixed(0, 1);
    DLOAD_0 = 0x26, "dload_0", false, fixed(0, 2);
    DLOAD_1 = 0x27, "dload_1", false, fixed(0, 2);
    DLOAD_2 = 0x28, "dload_2", false, fixed(0, 2);
    DLOAD_3 = 0x29, "dload_3", false, fixed(0, 2);
    ALOAD_0 = 0x2A, "aload_0", false, fixed(0, 1);
    ALOAD_1 = 0x2B, "aload_1", false, fixed(0, 1);
    ALOAD_2 = 0x2C, "aload_2", false, fixed(0, 1);
    ALOAD_3 = 0x2D, "aload_3", false, fixed(0, 1);
    IALOAD = 0x2E, "iaload", true, fixed(2, 1);
    LALOAD = 0x2F, "laload", true, fixed(2, 2);
    FALOAD = 0x30, "faload", true, fixed(2, 1);
    DALOAD = 0x31, "daload", true, fixed(2, 2);
    AALOAD = 0x32, "aaload", true, fixed(2, 1);
    BALOAD = 0x33, "baload", true, fixed(2, 1);
    CALOAD = 0x34, "caload", true, fixed(2, 1);
    SALOAD = 0x35, "saload", true, fixed(2, 1);

    // Stores
    ISTORE = 0x36, "istore", false, fixed(1, 0);
    LSTORE = 0x37, "lstore", false, fixed(2, 0);
    FSTORE = 0x38, "fstore", false, fixed(1, 0);
    DSTORE = 0x39, "dstore", false, fixed(2, 0);
    ASTORE = 0x3A, "astore", false, fixed(1, 0);
    ISTORE_0 = 0x3B, "istore_0", false, fixed(1, 0);
    ISTORE_1 = 0x3C, "istore_1", false, fixed(1, 0);
    ISTORE_2 = 0x3D, "istore_2", false, fixed(1, 0);
    ISTORE_3 = 0x3E, "istore_3", false, fixed(1, 0);
    LSTORE_0 = 0x3F, "lstore_0", false, fixed(2, 0);
    LSTORE_1 = 0x40, "lstore_1", false, fixed(2, 0);
    LSTORE_2 = 0x41, "lstore_2", false, fixed(2, 0);
    LSTORE_3 = 0x42, "lstore_3", false, fixed(2, 0);
    FSTORE_0 = 0x43, "fstore_0", false, fixed(1, 0);
    FSTORE_1 = 0x44, "fstore_1", false, fixed(1, 0);
    FSTORE_2 = 0x45, "fstore_2", false, fixed(1, 0);
    FSTORE_3 = 0x46, "fstore_3", false, fixed(1, 0);
    DSTORE_0 = 0x47, "dstore_0", false, fixed(2, 0);
    DSTORE_1 = 0x48, "dstore_1", false, fixed(2, 0);
    DSTORE_2 = 0x49, "dstore_2", false, fixed(2, 0);
    DSTORE_3 = 0x4A, "dstore_3", false, fixed(2, 0);
    ASTORE_0 = 0x4B, "astore_0", false, fixed(1, 0);
    ASTORE_1 = 0x4C, "astore_1", false, fixed(1, 0);
    ASTORE_2 = 0x4D, "astore_2", false, fixed(1, 0);
    ASTORE_3 = 0x4E, "astore_3", false, fixed(1, 0);
    IASTORE = 0x4F, "iastore", true, fixed(3, 0);
    LASTORE = 0x50, "lastore", true, fixed(4, 0);
    FASTORE = 0x51, "fastore", true, fixed(3, 0);
    DASTORE = 0x52, "dastore", true, fixed(4, 0);
    AASTORE = 0x53, "aastore", true, fixed(3, 0);
    BASTORE = 0x54, "bastore", true, fixed(3, 0);
    CASTORE = 0x55, "castore", true, fixed(3, 0);
    SASTORE = 0x56, "sastore", true, fixed(3, 0);

    // Stack
    POP = 0x57, "pop", true, fixed(1, 0);
    POP2 = 0x58, "pop2", true, fixed(2, 0);
    DUP = 0x59, "dup", true, fixed(1, 2);
    DUP_X1 = 0x5A, "dup_x1", true, fixed(2, 3);
    DUP_X2 = 0x5B, "dup_x2", true, fixed(3, 4);
    DUP2 = 0x5C, "dup2", true, fixed(2, 4);
    DUP2_X1 = 0x5D, "dup2_x1", true, fixed(3, 5);
    DUP2_X2 = 0x5E, "dup2_x2", true, fixed(4, 6);
    SWAP = 0x5F, "swap", true, fixed(2, 2);

    // Math
    IADD = 0x60, "iadd", true, fixed(2, 1);
    LADD = 0x61, "ladd", true, fixed(4, 2);
    FADD = 0x62, "fadd", true, fixed(2, 1);
    DADD = 0x63, "dadd", true, fixed(4, 2);
    ISUB = 0x64, "isub", true, fixed(2, 1);
    LSUB = 0x65, "lsub", true, fixed(4, 2);
    FSUB = 0x66, "fsub", true, fixed(2, 1);
    DSUB = 0x67, "dsub", true, fixed(4, 2);
    IMUL = 0x68, "imul", true, fixed(2, 1);
    LMUL = 0x69, "lmul", true, fixed(4, 2);
    FMUL = 0x6A, "fmul", true, fixed(2, 1);
    DMUL = 0x6B, "dmul", true, fixed(4, 2);
    IDIV = 0x6C, "idiv", true, fixed(2, 1);
    LDIV = 0x6D, "ldiv", true, fixed(4, 2);
    FDIV = 0x6E, "fdiv", true, fixed(2, 1);
    DDIV = 0x6F, "ddiv", true, fixed(4, 2);
    IREM = 0x70, "irem", true, fixed(2, 1);
    LREM = 0x71, "lrem", true, fixed(4, 2);
    FREM = 0x72, "frem", true, fixed(2, 1);
    DREM = 0x73, "drem", true, fixed(4, 2);
    INEG = 0x74, "ineg", true, fixed(1, 1);
    LNEG = 0x75, "lneg", true, fixed(2, 2);
    FNEG = 0x76, "fneg", true, fixed(1, 1);
    DNEG = 0x77, "dneg", true, fixed(2, 2);
    ISHL = 0x78, "ishl", true, fixed(2, 1);
    LSHL = 0x79, "lshl", true, fixed(3, 2);
    ISHR = 0x7A, "ishr", true, fixed(2, 1);
    LSHR = 0x7B, "lshr", true, fixed(3, 2);
    IUSHR = 0x7C, "iushr", true, fixed(2, 1);
    LUSHR = 0x7D, "lushr", true, fixed(3, 2);
    IAND = 0x7E, "iand", true, fixed(2, 1);
    LAND = 0x7F, "land", true, fixed(4, 2);
    IOR = 0x80, "ior", true, fixed(2, 1);
    LOR = 0x81, "lor", true, fixed(4, 2);
    IXOR = 0x82, "ixor", true, fixed(2, 1);
    LXOR = 0x83, "lxor", true, fixed(4, 2);
    IINC = 0x84, "iinc", false, fixed(0, 0);

    // Conversions
    I2L = 0x85, "i2l", true, fixed(1, 2);
    I2F = 0x86, "i2f", true, fixed(1, 1);
    I2D = 0x87, "i2d", true, fixed(1, 2);
    L2I = 0x88, "l2i", true, fixed(2, 1);
    L2F = 0x89, "l2f", true, fixed(2, 1);
    L2D = 0x8A, "l2d", true, fixed(2, 2);
    F2I = 0x8B, "f2i", true, fixed(1, 1);
    F2L = 0x8C, "f2l", true, fixed(1, 2);
    F2D = 0x8D, "f2d", true, fixed(1, 2);
    D2I = 0x8E, "d2i", true, fixed(2, 1);
    D2L = 0x8F, "d2l", true, fixed(2, 2);
    D2F = 0x90, "d2f", true, fixed(2, 1);
    I2B = 0x91, "i2b", true, fixed(1, 1);
    I2C = 0x92, "i2c", true, fixed(1, 1);
    I2S = 0x93, "i2s", true, fixed(1, 1);

    // Comparisons
    LCMP = 0x94, "lcmp", true, fixed(4, 1);
    FCMPL = 0x95, "fcmpl", true, fixed(2, 1);
    FCMPG = 0x96, "fcmpg", true, fixed(2, 1);
    DCMPL = 0x97, "dcmpl", true, fixed(4, 1);
    DCMPG = 0x98, "dcmpg", true, fixed(4, 1);
    IFEQ = 0x99, "ifeq", false, fixed(1, 0);
    IFNE = 0x9A, "ifne", false, fixed(1, 0);
    IFLT = 0x9B, "iflt", false, fixed(1, 0);
    IFGE = 0x9C, "ifge", false, fixed(1, 0);
    IFGT = 0x9D, "ifgt", false, fixed(1, 0);
    IFLE = 0x9E, "ifle", false, fixed(1, 0);
    IF_ICMPEQ = 0x9F, "if_icmpeq", false, fixed(2, 0);
    IF_ICMPNE = 0xA0, "if_icmpne", false, fixed(2, 0);
    IF_ICMPLT = 0xA1, "if_icmplt", false, fixed(2, 0);
    IF_ICMPGE = 0xA2, "if_icmpge", false, fixed(2, 0);
    IF_ICMPGT = 0xA3, "if_icmpgt", false, fixed(2, 0);
    IF_ICMPLE = 0xA4, "if_icmple", false, fixed(2, 0);
    IF_ACMPEQ = 0xA5, "if_acmpeq", false, fixed(2, 0);
    IF_ACMPNE = 0xA6, "if_acmpne", false, fixed(2, 0);

    // Control
    GOTO = 0xA7, "goto", false, fixed(0, 0);
    JSR = 0xA8, "jsr", false, fixed(0, 1);
    RET = 0xA9, "ret", false, fixed(0, 0);
    TABLESWITCH = 0xAA, "tableswitch", false, fixed(1, 0);
    LOOKUPSWITCH = 0xAB, "lookupswitch", false, fixed(1, 0);
    IRETURN = 0xAC, "ireturn", false, fixed(1, 0);
    LRETURN = 0xAD, "lreturn", false, fixed(2, 0);
    FRETURN = 0xAE, "freturn", false, fixed(1, 0);
    DRETURN = 0xAF, "dreturn", false, fixed(2, 0);
    ARETURN = 0xB0, "areturn", false, fixed(1, 0);
    RETURN = 0xB1, "return", false, fixed(0, 0);

    // References
    GETSTATIC = 0xB2, "getstatic", false, VARIABLE;
    PUTSTATIC = 0xB3, "putstatic", false, VARIABLE;
    GETFIELD = 0xB4, "getfield", false, VARIABLE;
    PUTFIELD = 0xB5, "putfield", false, VARIABLE;
    INVOKEVIRTUAL = 0xB6, "invokevirtual", false, VARIABLE;
    INVOKESPECIAL = 0xB7, "invokespecial", false, VARIABLE;
    INVOKESTATIC = 0xB8, "invokestatic", false, VARIABLE;
    INVOKEINTERFACE = 0xB9, "invokeinterface", false, VARIABLE;
    INVOKEDYNAMIC = 0xBA, "invokedynamic", false, VARIABLE;
    NEW = 0xBB, "new", false, fixed(0, 1);
    NEWARRAY = 0xBC, "newarray", false, fixed(1, 1);
    ANEWARRAY = 0xBD, "anewarray", false, fixed(1, 1);
    ARRAYLENGTH = 0xBE, "arraylength", true, fixed(1, 1);
    ATHROW = 0xBF, "athrow", true, fixed(1, 0);
    CHECKCAST = 0xC0, "checkcast", false, fixed(1, 1);
    INSTANCEOF = 0xC1, "instanceof", false, fixed(1, 1);
    MONITORENTER = 0xC2, "monitorenter", true, fixed(1, 0);
    MONITOREXIT = 0xC3, "monitorexit", true, fixed(1, 0);

    // Extended
    WIDE = 0xC4, "wide", false, fixed(0, 0);
    MULTIANEWARRAY = 0xC5, "multianewarray", false, VARIABLE;
    IFNULL = 0xC6, "ifnull", false, fixed(1, 0);
    IFNONNULL = 0xC7, "ifnonnull", false, fixed(1, 0);
    GOTO_W = 0xC8, "goto_w", false, fixed(0, 0);
    JSR_W = 0xC9, "jsr_w", false, fixed(0, 1);
}

/// Mnemonic of `opcode`, or `"<unknown>"`.
#[must_use]
pub fn mnemonic(opcode: u8) -> &'static str {
    info(opcode).map_or("<unknown>", |i| i.mnemonic)
}

/// Returns `true` if `opcode` is an operand-less operation.
#[must_use]
pub fn is_simple(opcode: u8) -> bool {
    info(opcode).is_some_and(|i| i.simple)
}

/// Returns `true` for the short-form branch opcodes a `Branch` instruction may carry.
#[must_use]
pub fn is_branch(opcode: u8) -> bool {
    matches!(opcode, IFEQ..=JSR | IFNULL | IFNONNULL)
}

/// Returns `true` for conditional branches.
#[must_use]
pub fn is_conditional_branch(opcode: u8) -> bool {
    matches!(opcode, IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL)
}

/// The conditional branch testing the opposite condition.
#[must_use]
pub fn invert_branch(opcode: u8) -> Option<u8> {
    match opcode {
        IFEQ..=IF_ACMPNE => Some(if (opcode - IFEQ) % 2 == 0 {
            opcode + 1
        } else {
            opcode - 1
        }),
        IFNULL => Some(IFNONNULL),
        IFNONNULL => Some(IFNULL),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_defined_opcode_has_info() {
        for opcode in NOP..=JSR_W {
            assert!(info(opcode).is_some(), "missing info for 0x{opcode:02X}");
        }
        assert!(info(0xCA).is_none());
        assert!(info(0xFF).is_none());
    }

    #[test]
    fn mnemonics() {
        assert_eq!(mnemonic(INVOKEVIRTUAL), "invokevirtual");
        assert_eq!(mnemonic(DUP2_X2), "dup2_x2");
        assert_eq!(mnemonic(0xFE), "<unknown>");
    }

    #[test]
    fn stack_effects() {
        assert_eq!(info(LCMP).map(|i| i.stack), Some(fixed(4, 1)));
        assert_eq!(info(LSHL).map(|i| i.stack), Some(fixed(3, 2)));
        assert_eq!(info(INVOKESTATIC).map(|i| i.stack), Some(VARIABLE));
    }

    #[test]
    fn branch_inversion() {
        assert_eq!(invert_branch(IFEQ), Some(IFNE));
        assert_eq!(invert_branch(IFNE), Some(IFEQ));
        assert_eq!(invert_branch(IF_ICMPLT), Some(IF_ICMPGE));
        assert_eq!(invert_branch(IF_ACMPNE), Some(IF_ACMPEQ));
        assert_eq!(invert_branch(IFNULL), Some(IFNONNULL));
        assert_eq!(invert_branch(GOTO), None);
        assert!(is_branch(JSR));
        assert!(!is_conditional_branch(GOTO));
    }
}
