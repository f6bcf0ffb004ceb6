use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const ENV_PASSPHRASE: &str = "CRYPTNOS_PASSPHRASE";

pub fn read_passphrase() -> Result<Zeroizing<String>> {
    //  Environment Variable
    //  CRYPTNOS_PASSPHRASE="correct horse" cryptnos show example.com
    if let Ok(pw) = std::env::var(ENV_PASSPHRASE) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    read_line_or_prompt("Passphrase: ")
}

/// Passphrase for an import file; always read from stdin or a prompt so
/// it can differ from the store passphrase.
pub fn read_file_passphrase() -> Result<Zeroizing<String>> {
    read_line_or_prompt("Export file passphrase: ")
}

fn read_line_or_prompt(prompt: &str) -> Result<Zeroizing<String>> {
    //  stdin (Pipeline)
    //  echo "correct horse" | cryptnos show example.com
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
    } else {
        let pw = Zeroizing::new(rpassword::prompt_password(prompt)?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("no passphrase provided")
}

/// Reads a new passphrase twice and checks both entries match.
pub fn read_new_passphrase_with_confirmation() -> Result<Zeroizing<String>> {
    let (pw1, pw2) = if !io::stdin().is_terminal() {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut pw1 = Zeroizing::new(String::new());
        let mut pw2 = Zeroizing::new(String::new());

        handle.read_line(&mut pw1)?;
        handle.read_line(&mut pw2)?;

        trim_newline(&mut pw1);
        trim_newline(&mut pw2);
        (pw1, pw2)
    } else {
        (
            Zeroizing::new(rpassword::prompt_password("New export passphrase: ")?),
            Zeroizing::new(rpassword::prompt_password("Confirm passphrase: ")?),
        )
    };

    if pw1.is_empty() {
        bail!("passphrase cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passphrases do not match");
    }

    Ok(pw1)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
